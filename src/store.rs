//! SQLite copy of the fully featured historical table, so training can be
//! rerun without the raw data or the network.

use std::path::Path;

use anyhow::{Context, Result, anyhow};
use chrono::{NaiveDate, Utc};
use rusqlite::{Connection, Row, params};
use tracing::info;

use crate::team_games::{
    GameStats, HomeWeather, MatchupFeatures, RollingStats, Stage, TeamGameRow, TeamGameTable,
};

pub struct TeamGameStore {
    conn: Connection,
}

impl TeamGameStore {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create store dir {}", parent.display()))?;
        }
        let conn =
            Connection::open(path).with_context(|| format!("open sqlite db {}", path.display()))?;
        init_schema(&conn)?;
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("open in-memory sqlite db")?;
        init_schema(&conn)?;
        Ok(Self { conn })
    }

    /// Replaces the stored table with `table` in a single transaction.
    pub fn replace_all(&mut self, table: &TeamGameTable) -> Result<usize> {
        let tx = self.conn.transaction().context("begin store transaction")?;
        tx.execute("DELETE FROM team_games", [])
            .context("clear team_games")?;
        tx.execute("DELETE FROM completed_stages", [])
            .context("clear completed_stages")?;
        for row in &table.rows {
            insert_row(&tx, row)?;
        }
        for stage in table.completed() {
            tx.execute(
                "INSERT INTO completed_stages(stage) VALUES (?1)",
                params![stage_name(stage)],
            )
            .context("insert completed stage")?;
        }
        tx.execute(
            "INSERT INTO store_meta(key, value) VALUES ('saved_at', ?1)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![Utc::now().to_rfc3339()],
        )
        .context("update store meta")?;
        tx.commit().context("commit store transaction")?;
        info!(rows = table.len(), "team-game table stored");
        Ok(table.len())
    }

    /// Rows ordered by team then chronology, with the stages they were saved with.
    pub fn load_all(&self) -> Result<TeamGameTable> {
        let mut stmt = self
            .conn
            .prepare(
                r#"
                SELECT
                    game_id, season, week, game_date, team, opponent, is_home,
                    points_for, points_against, total_points, total_line,
                    starting_qb, qb_avg_epa, def_epa, plays, seconds_per_play,
                    r_points_for, r_points_against, r_qb_epa, r_def_epa, r_off_pace,
                    h_points_for, h_points_against, h_qb_epa, h_def_epa, h_off_pace,
                    a_points_for, a_points_against, a_qb_epa, a_def_epa, a_off_pace,
                    temperature, precipitation, wind_speed,
                    home_starting_qb, away_starting_qb
                FROM team_games
                ORDER BY team ASC, season ASC, week ASC, game_date ASC, game_id ASC
                "#,
            )
            .context("prepare load team_games query")?;
        let rows = stmt
            .query_map([], decode_row)
            .context("query team_games")?;

        let mut out = Vec::new();
        for row in rows {
            out.push(row.context("decode team_games row")?);
        }

        let mut stmt = self
            .conn
            .prepare("SELECT stage FROM completed_stages")
            .context("prepare stages query")?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .context("query stages")?;
        let mut stages = Vec::new();
        for name in names {
            let name = name.context("decode stage")?;
            let stage = Stage::ALL
                .into_iter()
                .find(|s| stage_name(*s) == name)
                .ok_or_else(|| anyhow!("unknown stage {name:?} in store"))?;
            stages.push(stage);
        }

        Ok(TeamGameTable::from_rows(out, stages))
    }

    pub fn saved_at(&self) -> Result<Option<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT value FROM store_meta WHERE key = 'saved_at'")
            .context("prepare meta query")?;
        let mut rows = stmt.query([]).context("query meta")?;
        match rows.next().context("read meta row")? {
            Some(row) => Ok(Some(row.get(0)?)),
            None => Ok(None),
        }
    }
}

pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        PRAGMA journal_mode = WAL;
        CREATE TABLE IF NOT EXISTS team_games (
            game_id TEXT NOT NULL,
            team TEXT NOT NULL,
            season INTEGER NOT NULL,
            week INTEGER NOT NULL,
            game_date TEXT NOT NULL,
            opponent TEXT NOT NULL,
            is_home INTEGER NOT NULL,
            points_for INTEGER NULL,
            points_against INTEGER NULL,
            total_points INTEGER NULL,
            total_line REAL NULL,
            starting_qb TEXT NULL,
            qb_avg_epa REAL NULL,
            def_epa REAL NULL,
            plays INTEGER NULL,
            seconds_per_play REAL NULL,
            r_points_for REAL NULL,
            r_points_against REAL NULL,
            r_qb_epa REAL NULL,
            r_def_epa REAL NULL,
            r_off_pace REAL NULL,
            h_points_for REAL NULL,
            h_points_against REAL NULL,
            h_qb_epa REAL NULL,
            h_def_epa REAL NULL,
            h_off_pace REAL NULL,
            a_points_for REAL NULL,
            a_points_against REAL NULL,
            a_qb_epa REAL NULL,
            a_def_epa REAL NULL,
            a_off_pace REAL NULL,
            temperature REAL NULL,
            precipitation REAL NULL,
            wind_speed REAL NULL,
            home_starting_qb TEXT NULL,
            away_starting_qb TEXT NULL,
            PRIMARY KEY (game_id, team)
        );
        CREATE INDEX IF NOT EXISTS idx_team_games_season ON team_games(season);

        CREATE TABLE IF NOT EXISTS completed_stages (
            stage TEXT PRIMARY KEY
        );

        CREATE TABLE IF NOT EXISTS store_meta (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );
        "#,
    )
    .context("create sqlite schema")?;
    Ok(())
}

fn stage_name(stage: Stage) -> &'static str {
    match stage {
        Stage::Scoring => "scoring",
        Stage::Qb => "qb",
        Stage::Defense => "defense",
        Stage::Pace => "pace",
        Stage::Weather => "weather",
    }
}

fn insert_row(tx: &rusqlite::Transaction<'_>, r: &TeamGameRow) -> Result<()> {
    let m = &r.matchup;
    tx.execute(
        r#"
        INSERT INTO team_games (
            game_id, team, season, week, game_date, opponent, is_home,
            points_for, points_against, total_points, total_line,
            starting_qb, qb_avg_epa, def_epa, plays, seconds_per_play,
            r_points_for, r_points_against, r_qb_epa, r_def_epa, r_off_pace,
            h_points_for, h_points_against, h_qb_epa, h_def_epa, h_off_pace,
            a_points_for, a_points_against, a_qb_epa, a_def_epa, a_off_pace,
            temperature, precipitation, wind_speed,
            home_starting_qb, away_starting_qb
        ) VALUES (
            ?1, ?2, ?3, ?4, ?5, ?6, ?7,
            ?8, ?9, ?10, ?11,
            ?12, ?13, ?14, ?15, ?16,
            ?17, ?18, ?19, ?20, ?21,
            ?22, ?23, ?24, ?25, ?26,
            ?27, ?28, ?29, ?30, ?31,
            ?32, ?33, ?34,
            ?35, ?36
        )
        "#,
        params![
            r.game_id,
            r.team,
            r.season,
            r.week,
            r.date.format("%Y-%m-%d").to_string(),
            r.opponent,
            r.is_home,
            r.points_for,
            r.points_against,
            r.total_points,
            r.total_line,
            r.stats.starting_qb,
            r.stats.qb_avg_epa,
            r.stats.def_epa,
            r.stats.plays,
            r.stats.seconds_per_play,
            r.rolling.points_for,
            r.rolling.points_against,
            r.rolling.qb_epa,
            r.rolling.def_epa,
            r.rolling.off_pace,
            m.home.points_for,
            m.home.points_against,
            m.home.qb_epa,
            m.home.def_epa,
            m.home.off_pace,
            m.away.points_for,
            m.away.points_against,
            m.away.qb_epa,
            m.away.def_epa,
            m.away.off_pace,
            m.weather.temperature,
            m.weather.precipitation,
            m.weather.wind_speed,
            m.home_starting_qb,
            m.away_starting_qb,
        ],
    )
    .with_context(|| format!("insert team game {} / {}", r.game_id, r.team))?;
    Ok(())
}

fn rolling_at(row: &Row<'_>, first: usize) -> rusqlite::Result<RollingStats> {
    Ok(RollingStats {
        points_for: row.get(first)?,
        points_against: row.get(first + 1)?,
        qb_epa: row.get(first + 2)?,
        def_epa: row.get(first + 3)?,
        off_pace: row.get(first + 4)?,
    })
}

fn decode_row(row: &Row<'_>) -> rusqlite::Result<TeamGameRow> {
    let date_raw: String = row.get(3)?;
    let date = NaiveDate::parse_from_str(&date_raw, "%Y-%m-%d").map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(3, rusqlite::types::Type::Text, Box::new(e))
    })?;
    Ok(TeamGameRow {
        game_id: row.get(0)?,
        season: row.get(1)?,
        week: row.get(2)?,
        date,
        team: row.get(4)?,
        opponent: row.get(5)?,
        is_home: row.get::<_, i64>(6)? != 0,
        points_for: row.get(7)?,
        points_against: row.get(8)?,
        total_points: row.get(9)?,
        total_line: row.get(10)?,
        stats: GameStats {
            starting_qb: row.get(11)?,
            qb_avg_epa: row.get(12)?,
            def_epa: row.get(13)?,
            plays: row.get(14)?,
            seconds_per_play: row.get(15)?,
        },
        rolling: rolling_at(row, 16)?,
        matchup: MatchupFeatures {
            home: rolling_at(row, 21)?,
            away: rolling_at(row, 26)?,
            weather: HomeWeather {
                temperature: row.get(31)?,
                precipitation: row.get(32)?,
                wind_speed: row.get(33)?,
            },
            home_starting_qb: row.get(34)?,
            away_starting_qb: row.get(35)?,
        },
    })
}
