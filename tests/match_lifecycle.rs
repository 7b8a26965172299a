//! End-to-end match lifecycle: submissions gate execution, the judge runs
//! off the event path, results and forfeitures share one publication
//! path, and teardown always happens. The judge is a scripted shell
//! process honoring the real process/IO contract.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinSet;
use tokio::time::timeout;
use uuid::Uuid;

use codebattle_backend::archive::{MatchArchive, MatchRecord};
use codebattle_backend::metrics::counters::Counters;
use codebattle_backend::notify::{ChannelNotifier, ServerEvent};
use codebattle_backend::publish::ResultPublisher;
use codebattle_backend::queue::OrderedQueueStore;
use codebattle_backend::queue::memory::InMemoryQueueStore;
use codebattle_backend::room::memory::InMemoryRoomStore;
use codebattle_backend::room::{
    GameMap, MatchRoom, RoomStore, SubmissionService, Winner,
};
use codebattle_backend::room::model::ResultReason;
use codebattle_backend::sandbox::{
    HarnessTemplater, JudgeConfig, Language, RunDispatcher, SandboxRunner,
};
use codebattle_backend::session::{DisconnectCoordinator, InMemorySessionRegistry, SessionRegistry};

const GAME: &str = "land_grab";

const WIN_P1_SCRIPT: &str =
    r#"echo '{"winner": "p1", "final_scores": {"p1": 30, "p2": 12}, "total_turns": 50}'"#;

struct EchoHarness;

#[async_trait]
impl HarnessTemplater for EchoHarness {
    async fn render(&self, _language: Language, source: &str) -> Result<String> {
        Ok(source.to_string())
    }
}

struct RecordingArchive {
    saved: Mutex<Vec<MatchRecord>>,
}

#[async_trait]
impl MatchArchive for RecordingArchive {
    async fn save(&self, record: &MatchRecord) -> Result<()> {
        self.saved.lock().push(record.clone());
        Ok(())
    }
}

fn scripted_judge(script: &str) -> JudgeConfig {
    JudgeConfig {
        program: "/bin/sh".to_string(),
        base_args: vec!["-c".to_string(), script.to_string(), "judge".to_string()],
        image: None,
        entrypoint: vec![],
        timeout: Duration::from_secs(5),
    }
}

struct Fixture {
    work_dir: PathBuf,
    queues: Arc<InMemoryQueueStore>,
    rooms: Arc<InMemoryRoomStore>,
    registry: Arc<InMemorySessionRegistry>,
    notifier: Arc<ChannelNotifier>,
    archive: Arc<RecordingArchive>,
    submissions: Arc<SubmissionService>,
    disconnects: DisconnectCoordinator,
}

impl Fixture {
    fn new(script: &str) -> Self {
        let work_dir = std::env::temp_dir().join(format!("cb-lifecycle-{}", Uuid::new_v4()));

        let queues = Arc::new(InMemoryQueueStore::new());
        let rooms = Arc::new(InMemoryRoomStore::new());
        let registry = Arc::new(InMemorySessionRegistry::new());
        let notifier = Arc::new(ChannelNotifier::default());
        let archive = Arc::new(RecordingArchive {
            saved: Mutex::new(vec![]),
        });
        let counters = Counters::default();

        let publisher = Arc::new(ResultPublisher::new(
            rooms.clone(),
            registry.clone(),
            notifier.clone(),
            archive.clone(),
            counters.clone(),
        ));

        let runner = Arc::new(SandboxRunner::new(
            scripted_judge(script),
            Arc::new(EchoHarness),
            work_dir.clone(),
        ));

        let (run_tx, run_rx) = mpsc::channel(64);
        let dispatcher = Arc::new(RunDispatcher::new(
            rooms.clone(),
            runner,
            publisher.clone(),
            counters.clone(),
        ));
        tokio::spawn(dispatcher.run(run_rx));

        let submissions = Arc::new(SubmissionService::new(
            rooms.clone(),
            notifier.clone(),
            run_tx,
            counters.clone(),
        ));

        let disconnects = DisconnectCoordinator::new(
            registry.clone(),
            queues.clone(),
            rooms.clone(),
            publisher,
            vec![GAME.to_string()],
            counters,
        );

        Fixture {
            work_dir,
            queues,
            rooms,
            registry,
            notifier,
            archive,
            submissions,
            disconnects,
        }
    }

    async fn open_room(&self, match_id: &str) -> MatchRoom {
        let map = GameMap {
            walls: vec![[1, 1]],
            coins: vec![[2, 2]],
            extra: serde_json::Map::new(),
        };
        let room = MatchRoom::new(match_id.to_string(), GAME.to_string(), map, 1, 2);
        self.rooms.create(room.clone()).await.unwrap();
        self.registry.bind_user_match(1, match_id).await.unwrap();
        self.registry.bind_user_match(2, match_id).await.unwrap();
        room
    }
}

impl Drop for Fixture {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.work_dir);
    }
}

/// Skips room notifications and returns the first RESULT/ERROR event.
async fn next_terminal(rx: &mut broadcast::Receiver<ServerEvent>) -> ServerEvent {
    loop {
        let event = timeout(Duration::from_secs(10), rx.recv())
            .await
            .expect("no terminal event before timeout")
            .expect("event stream closed");
        match event {
            ServerEvent::Notification { .. } => continue,
            terminal => return terminal,
        }
    }
}

#[tokio::test]
async fn both_submissions_execute_judge_and_deliver_result() {
    let f = Fixture::new(WIN_P1_SCRIPT);
    f.open_room("m1").await;

    let mut rx = f.notifier.subscribe_match("m1");

    f.submissions
        .handle_submission("m1", 1, "print('p1')".into(), Language::Python)
        .await
        .unwrap();
    f.submissions
        .handle_submission("m1", 2, "console.log('p2')".into(), Language::Javascript)
        .await
        .unwrap();

    match next_terminal(&mut rx).await {
        ServerEvent::Result { result } => {
            assert_eq!(result.winner, Winner::P1);
            assert_eq!(result.reason, ResultReason::Completed);
            assert_eq!(result.final_scores.p1, 30);
            assert_eq!(result.total_turns, Some(50));
        }
        other => panic!("expected RESULT, got {other:?}"),
    }

    // Teardown: room gone, mappings gone, match archived with both codes.
    assert!(f.rooms.get("m1").await.unwrap().is_none());
    assert_eq!(f.registry.match_for_user(1).await.unwrap(), None);
    assert_eq!(f.registry.match_for_user(2).await.unwrap(), None);

    let saved = f.archive.saved.lock();
    assert_eq!(saved.len(), 1);
    assert_eq!(saved[0].match_id, "m1");
    assert_eq!(saved[0].p1_code.as_deref(), Some("print('p1')"));
    assert_eq!(saved[0].p2_lang.as_deref(), Some("javascript"));
}

#[tokio::test]
async fn submission_storm_runs_the_judge_at_most_once() {
    let f = Fixture::new(WIN_P1_SCRIPT);
    f.open_room("m1").await;

    let mut rx = f.notifier.subscribe_match("m1");

    let submissions = Arc::clone(&f.submissions);
    let mut set = JoinSet::new();
    for i in 0..16 {
        let s = Arc::clone(&submissions);
        let user = if i % 2 == 0 { 1 } else { 2 };
        set.spawn(async move {
            s.handle_submission("m1", user, format!("v{i}"), Language::Python)
                .await
                .unwrap();
        });
    }
    while set.join_next().await.is_some() {}

    assert!(matches!(
        next_terminal(&mut rx).await,
        ServerEvent::Result { .. }
    ));

    // Let any (incorrect) second run surface before checking.
    tokio::time::sleep(Duration::from_millis(200)).await;
    loop {
        match rx.try_recv() {
            Ok(ServerEvent::Notification { .. }) => continue,
            Ok(other) => panic!("second terminal event delivered: {other:?}"),
            Err(_) => break,
        }
    }
    assert_eq!(f.archive.saved.lock().len(), 1);
}

#[tokio::test]
async fn disconnect_before_opponent_submits_forfeits_the_match() {
    // Scenario: p1 submits code, then p1 disconnects before p2 submits.
    let f = Fixture::new(WIN_P1_SCRIPT);
    f.open_room("m1").await;
    f.registry.bind_connection("sess-1", 1).await.unwrap();
    f.registry.bind_game("sess-1", "m1").await.unwrap();

    let mut rx = f.notifier.subscribe_match("m1");

    f.submissions
        .handle_submission("m1", 1, "print('p1')".into(), Language::Python)
        .await
        .unwrap();

    f.disconnects.on_disconnect("sess-1").await.unwrap();

    match next_terminal(&mut rx).await {
        ServerEvent::Result { result } => {
            assert_eq!(result.winner, Winner::P2);
            assert_eq!(result.reason, ResultReason::OpponentDisconnected);
            assert_eq!((result.final_scores.p1, result.final_scores.p2), (0, 0));
            assert!(result.logs.is_none());
        }
        other => panic!("expected forfeiture RESULT, got {other:?}"),
    }

    assert!(f.rooms.get("m1").await.unwrap().is_none());

    // The forfeiture record still carries what p1 had submitted.
    {
        let saved = f.archive.saved.lock();
        assert_eq!(saved.len(), 1);
        assert_eq!(saved[0].p1_code.as_deref(), Some("print('p1')"));
        assert!(saved[0].p2_code.is_none());
    }

    // A late submission from p2 hits no room and changes nothing.
    f.submissions
        .handle_submission("m1", 2, "late".into(), Language::Python)
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(f.archive.saved.lock().len(), 1);
    assert_eq!(f.queues.size(GAME).await.unwrap(), 0);
}

#[tokio::test]
async fn judge_failure_surfaces_as_error_and_still_tears_down() {
    let f = Fixture::new("echo 'boom' >&2; exit 7");
    f.open_room("m1").await;

    let mut rx = f.notifier.subscribe_match("m1");

    f.submissions
        .handle_submission("m1", 1, "a".into(), Language::Python)
        .await
        .unwrap();
    f.submissions
        .handle_submission("m1", 2, "b".into(), Language::Python)
        .await
        .unwrap();

    match next_terminal(&mut rx).await {
        ServerEvent::Error { error } => {
            assert!(error.contains("Execution Failed"), "got: {error}");
        }
        other => panic!("expected ERROR, got {other:?}"),
    }

    // Sandbox errors are delivered but never persisted; the room is gone.
    assert!(f.archive.saved.lock().is_empty());
    assert!(f.rooms.get("m1").await.unwrap().is_none());
}
