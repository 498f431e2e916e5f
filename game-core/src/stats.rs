use std::collections::HashMap;

use protocol::pack::Choice;
use protocol::payload::{ChoiceStat, LeaderboardEntry, PlayerInfo};

/// Per-choice vote counts and percentages for a reveal. Only the first
/// selected choice of each submission is counted; unknown choice ids are
/// skipped.
pub fn build_choice_stats(
    choices: &[Choice],
    answers: &HashMap<String, Vec<String>>,
) -> (HashMap<String, ChoiceStat>, u32) {
    let mut stats: HashMap<String, ChoiceStat> = choices
        .iter()
        .map(|choice| {
            (
                choice.id.clone(),
                ChoiceStat {
                    count: 0,
                    percent: 0,
                },
            )
        })
        .collect();

    let mut total_answered = 0u32;
    for selected in answers.values() {
        let Some(choice_id) = selected.first() else {
            continue;
        };
        let Some(stat) = stats.get_mut(choice_id) else {
            continue;
        };
        stat.count += 1;
        total_answered += 1;
    }

    if total_answered > 0 {
        for stat in stats.values_mut() {
            stat.percent =
                ((stat.count as f64 / total_answered as f64) * 100.0).round() as u32;
        }
    }

    (stats, total_answered)
}

/// Score-ordered standings; ties keep join order.
pub fn build_leaderboard(
    players: &[PlayerInfo],
    scores: &HashMap<String, u32>,
) -> Vec<LeaderboardEntry> {
    let mut entries: Vec<LeaderboardEntry> = players
        .iter()
        .map(|player| LeaderboardEntry {
            id: player.id.clone(),
            nickname: player.nickname.clone(),
            score: scores.get(&player.id).copied().unwrap_or(0),
        })
        .collect();
    entries.sort_by(|a, b| b.score.cmp(&a.score));
    entries
}

#[cfg(test)]
mod tests {
    use super::*;

    fn choices() -> Vec<Choice> {
        vec![
            Choice {
                id: "a".into(),
                text: "A".into(),
            },
            Choice {
                id: "b".into(),
                text: "B".into(),
            },
        ]
    }

    #[test]
    fn counts_and_percentages() {
        let mut answers = HashMap::new();
        answers.insert("p1".to_string(), vec!["a".to_string()]);
        answers.insert("p2".to_string(), vec!["a".to_string()]);
        answers.insert("p3".to_string(), vec!["b".to_string()]);

        let (stats, total) = build_choice_stats(&choices(), &answers);
        assert_eq!(total, 3);
        assert_eq!(stats["a"], ChoiceStat { count: 2, percent: 67 });
        assert_eq!(stats["b"], ChoiceStat { count: 1, percent: 33 });
    }

    #[test]
    fn unknown_choice_is_skipped() {
        let mut answers = HashMap::new();
        answers.insert("p1".to_string(), vec!["zz".to_string()]);

        let (stats, total) = build_choice_stats(&choices(), &answers);
        assert_eq!(total, 0);
        assert_eq!(stats["a"].count, 0);
    }

    #[test]
    fn leaderboard_sorts_desc_and_keeps_join_order_on_ties() {
        let players = vec![
            PlayerInfo {
                id: "p1".into(),
                nickname: "ada".into(),
                is_ready: true,
                is_connected: true,
            },
            PlayerInfo {
                id: "p2".into(),
                nickname: "lin".into(),
                is_ready: true,
                is_connected: true,
            },
            PlayerInfo {
                id: "p3".into(),
                nickname: "kay".into(),
                is_ready: true,
                is_connected: false,
            },
        ];
        let mut scores = HashMap::new();
        scores.insert("p1".to_string(), 500);
        scores.insert("p2".to_string(), 900);
        scores.insert("p3".to_string(), 500);

        let entries = build_leaderboard(&players, &scores);
        let ids: Vec<_> = entries.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["p2", "p1", "p3"]);
    }
}
