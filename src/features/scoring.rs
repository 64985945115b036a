use tracing::info;

use super::rolling::{RollingWindow, roll_feature};
use crate::team_games::{RollingFeature, Stage, TeamGameTable};

/// Trailing points scored and allowed for each team.
pub fn create_scoring_features(table: &mut TeamGameTable, window: &RollingWindow) {
    roll_feature(table, RollingFeature::PointsFor, window, |row| {
        row.points_for.map(f64::from)
    });
    roll_feature(table, RollingFeature::PointsAgainst, window, |row| {
        row.points_against.map(f64::from)
    });
    table.mark(Stage::Scoring);
    info!(rows = table.len(), "scoring features created");
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, NaiveDate};

    use super::create_scoring_features;
    use crate::dataset::GameRecord;
    use crate::features::rolling::RollingWindow;
    use crate::team_games::project_team_games;

    fn kc_season(points: &[i32], season: i32) -> Vec<GameRecord> {
        let start = NaiveDate::from_ymd_opt(season, 9, 7).unwrap();
        points
            .iter()
            .enumerate()
            .map(|(i, pts)| GameRecord {
                game_id: format!("{season}_{:02}_KC", i + 1),
                season,
                week: i as i32 + 1,
                gameday: start + Duration::days(7 * i as i64),
                home_team: "KC".to_string(),
                away_team: format!("OPP{i}"),
                home_score: Some(*pts),
                away_score: Some(10),
                total_line: Some(45.0),
            })
            .collect()
    }

    #[test]
    fn sixth_game_averages_first_five() {
        let games = kc_season(&[24, 17, 30, 14, 21, 40], 2024);
        let mut table = project_team_games(&games);
        create_scoring_features(&mut table, &RollingWindow::default());

        let sixth = table
            .rows
            .iter()
            .find(|r| r.team == "KC" && r.week == 6)
            .unwrap();
        let avg = sixth.rolling.points_for.unwrap();
        assert!((avg - 21.2).abs() < 1e-9);
        assert_eq!(sixth.matchup.home.points_for, sixth.rolling.points_for);
    }

    #[test]
    fn window_resets_at_season_boundary() {
        let mut games = kc_season(&[50, 50, 50], 2023);
        games.extend(kc_season(&[10, 20], 2024));
        let mut table = project_team_games(&games);
        create_scoring_features(&mut table, &RollingWindow::default());

        let kc = table
            .rows
            .iter()
            .filter(|r| r.team == "KC" && r.season == 2024)
            .collect::<Vec<_>>();
        assert_eq!(kc[0].rolling.points_for, None);
        assert_eq!(kc[0].rolling.points_against, None);
        assert_eq!(kc[1].rolling.points_for, Some(10.0));
    }

    #[test]
    fn both_rows_of_a_game_carry_both_teams_values() {
        let mut games = kc_season(&[24, 17], 2024);
        // second game against a team that already played once
        games[1].away_team = "OPP0".to_string();
        let mut table = project_team_games(&games);
        create_scoring_features(&mut table, &RollingWindow::default());

        let rows = table
            .rows
            .iter()
            .filter(|r| r.game_id == games[1].game_id)
            .collect::<Vec<_>>();
        assert_eq!(rows.len(), 2);
        for row in rows {
            assert_eq!(row.matchup.home.points_for, Some(24.0));
            assert_eq!(row.matchup.away.points_for, Some(10.0));
            assert_eq!(row.matchup.away.points_against, Some(24.0));
        }
    }
}
