use deadpool_postgres::PoolError;
use thiserror::Error;
use tokio_postgres::Error as PgError;
use tracing::{info, instrument};

use crate::db::PgPool;

#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("failed to get postgres connection: {0}")]
    Pool(#[from] PoolError),
    #[error("failed to run migration: {0}")]
    Postgres(#[from] PgError),
}

struct Migration {
    id: i32,
    description: &'static str,
    sql: &'static str,
}

const MIGRATIONS: &[Migration] = &[
    Migration {
        id: 1,
        description: "employees, projects, matches, feedback",
        sql: r#"
CREATE TABLE IF NOT EXISTS staffing.employees (
    id BIGSERIAL PRIMARY KEY,
    employee_code TEXT NOT NULL UNIQUE,
    name TEXT NOT NULL,
    department TEXT NOT NULL DEFAULT '',
    position TEXT NOT NULL DEFAULT '',
    skills JSONB NOT NULL DEFAULT '[]'::jsonb,
    experience_years REAL NOT NULL DEFAULT 0 CHECK (experience_years >= 0),
    available_from DATE NOT NULL,
    available_until DATE,
    current_project_id BIGINT,
    skill_vector REAL[],
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    CONSTRAINT chk_employee_availability
        CHECK (available_until IS NULL OR available_until >= available_from)
);

CREATE TABLE IF NOT EXISTS staffing.projects (
    id BIGSERIAL PRIMARY KEY,
    title TEXT NOT NULL,
    description TEXT NOT NULL DEFAULT '',
    required_skills JSONB NOT NULL DEFAULT '[]'::jsonb,
    start_date DATE NOT NULL,
    end_date DATE NOT NULL,
    status TEXT NOT NULL DEFAULT 'PLANNING'
        CHECK (status IN ('PLANNING', 'IN_PROGRESS', 'COMPLETED', 'ON_HOLD')),
    manager_id BIGINT NOT NULL REFERENCES staffing.employees(id),
    team_size INTEGER NOT NULL CHECK (team_size >= 1),
    priority SMALLINT NOT NULL CHECK (priority BETWEEN 1 AND 5),
    skill_vector REAL[],
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    CONSTRAINT chk_project_window CHECK (end_date >= start_date)
);

DO $$
BEGIN
    IF NOT EXISTS (
        SELECT 1 FROM pg_constraint WHERE conname = 'fk_employee_current_project'
    ) THEN
        ALTER TABLE staffing.employees
            ADD CONSTRAINT fk_employee_current_project
            FOREIGN KEY (current_project_id) REFERENCES staffing.projects(id);
    END IF;
END $$;

CREATE TABLE IF NOT EXISTS staffing.matches (
    id BIGSERIAL PRIMARY KEY,
    project_id BIGINT NOT NULL REFERENCES staffing.projects(id),
    employee_id BIGINT NOT NULL REFERENCES staffing.employees(id),
    match_score DOUBLE PRECISION NOT NULL
        CHECK (match_score >= -1.0 AND match_score <= 1.0),
    skills_match_percentage DOUBLE PRECISION NOT NULL
        CHECK (skills_match_percentage >= 0.0 AND skills_match_percentage <= 100.0),
    availability_match BOOLEAN NOT NULL DEFAULT TRUE,
    status TEXT NOT NULL DEFAULT 'SUGGESTED'
        CHECK (status IN ('SUGGESTED', 'ACCEPTED', 'REJECTED', 'COMPLETED')),
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    CONSTRAINT uq_match_project_employee UNIQUE (project_id, employee_id)
);

CREATE INDEX IF NOT EXISTS idx_matches_project_ranking
    ON staffing.matches(project_id, match_score DESC, employee_id);

CREATE TABLE IF NOT EXISTS staffing.match_feedback (
    id BIGSERIAL PRIMARY KEY,
    match_id BIGINT NOT NULL REFERENCES staffing.matches(id),
    rating SMALLINT NOT NULL CHECK (rating BETWEEN 1 AND 5),
    text TEXT NOT NULL CHECK (length(btrim(text)) > 0),
    author_id BIGINT NOT NULL REFERENCES staffing.employees(id),
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

CREATE INDEX IF NOT EXISTS idx_match_feedback_match
    ON staffing.match_feedback(match_id, created_at);
"#,
    },
    Migration {
        id: 2,
        description: "index employees by current project",
        sql: r#"
CREATE INDEX IF NOT EXISTS idx_employees_current_project
    ON staffing.employees(current_project_id)
    WHERE current_project_id IS NOT NULL;
"#,
    },
    Migration {
        id: 3,
        description: "record the score basis of each match",
        sql: r#"
ALTER TABLE staffing.matches
    ADD COLUMN IF NOT EXISTS score_basis TEXT NOT NULL DEFAULT 'coverage'
        CHECK (score_basis IN ('cosine', 'coverage'));
"#,
    },
];

/// Apply pending migrations in id order, one transaction each.
#[instrument(skip(pool))]
pub async fn run_migrations(pool: &PgPool) -> Result<(), MigrationError> {
    let mut client = pool.get().await?;
    client
        .batch_execute(
            "CREATE SCHEMA IF NOT EXISTS staffing;
             CREATE TABLE IF NOT EXISTS staffing.schema_migrations (
                id INTEGER PRIMARY KEY,
                description TEXT NOT NULL,
                applied_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
             );",
        )
        .await?;

    for migration in MIGRATIONS {
        let already_applied: bool = client
            .query_one(
                "SELECT EXISTS (SELECT 1 FROM staffing.schema_migrations WHERE id = $1)",
                &[&migration.id],
            )
            .await?
            .get(0);

        if already_applied {
            continue;
        }

        let tx = client.transaction().await?;
        tx.batch_execute(migration.sql).await?;
        tx.execute(
            "INSERT INTO staffing.schema_migrations (id, description) VALUES ($1, $2)",
            &[&migration.id, &migration.description],
        )
        .await?;
        tx.commit().await?;

        info!(
            id = migration.id,
            description = migration.description,
            "applied migration"
        );
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matching::ScoreBasis;

    #[test]
    fn migration_ids_are_strictly_increasing() {
        let ids: Vec<i32> = MIGRATIONS.iter().map(|m| m.id).collect();
        assert!(ids.windows(2).all(|w| w[0] < w[1]), "{ids:?}");
    }

    #[test]
    fn match_table_enforces_pair_uniqueness() {
        let sql = MIGRATIONS[0].sql;
        assert!(sql.contains("UNIQUE (project_id, employee_id)"));
        assert!(sql.contains("'SUGGESTED', 'ACCEPTED', 'REJECTED', 'COMPLETED'"));
    }

    #[test]
    fn score_basis_column_accepts_both_bases() {
        let sql = MIGRATIONS
            .iter()
            .find(|m| m.sql.contains("score_basis"))
            .map(|m| m.sql)
            .unwrap();
        for basis in [ScoreBasis::Cosine, ScoreBasis::Coverage] {
            assert!(sql.contains(&format!("'{}'", basis.as_ref())), "{basis:?}");
        }
    }
}
