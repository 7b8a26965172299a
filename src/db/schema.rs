use sqlx::AnyPool;

pub async fn migrate(pool: &AnyPool) -> anyhow::Result<()> {
    // Finished matches (normal and forfeited alike)
    sqlx::query(
        r#"
CREATE TABLE IF NOT EXISTS matches (
  match_id TEXT PRIMARY KEY,
  game_type TEXT NOT NULL,
  p1_id BIGINT NOT NULL,
  p2_id BIGINT NOT NULL,
  winner TEXT NOT NULL,
  reason TEXT NOT NULL,
  p1_score BIGINT NOT NULL,
  p2_score BIGINT NOT NULL,
  p1_code TEXT,
  p1_lang TEXT,
  p2_code TEXT,
  p2_lang TEXT,
  finished_ms BIGINT NOT NULL
);
"#,
    )
    .execute(pool)
    .await?;

    sqlx::query(r#"CREATE INDEX IF NOT EXISTS idx_matches_p1 ON matches(p1_id);"#)
        .execute(pool)
        .await?;

    sqlx::query(r#"CREATE INDEX IF NOT EXISTS idx_matches_p2 ON matches(p2_id);"#)
        .execute(pool)
        .await?;

    Ok(())
}
