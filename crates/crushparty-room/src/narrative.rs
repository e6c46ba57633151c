//! Lounge chatter and the victory speech.

use crushparty_protocol::{Standing, UserId};

fn points(score: u32) -> String {
    if score == 1 {
        "1 point".to_owned()
    } else {
        format!("{score} points")
    }
}

fn places(n: u32) -> String {
    if n == 1 {
        "1 place".to_owned()
    } else {
        format!("{n} places")
    }
}

/// Dialogue for a lounge intermission. `before` are the standings at the
/// previous boundary (empty after the first round).
pub fn lounge_dialogue(before: &[Standing], after: &[Standing], next_category: &str) -> Vec<String> {
    let mut lines = Vec::new();

    match after.first() {
        None => lines.push("The lounge is empty. Even the bartender left.".to_owned()),
        Some(leader) if leader.score == 0 => {
            lines.push("Nobody has scored yet. Anyone's game!".to_owned());
        }
        Some(leader) => {
            lines.push(format!("{} leads with {}.", leader.username, points(leader.score)));
        }
    }

    if let Some((climber, gained)) = biggest_climber(before, after) {
        lines.push(format!("{} climbed {} since last round.", climber.username, places(gained)));
    }

    if after.len() > 1 {
        if let Some(last) = after.last() {
            lines.push(format!("{} is bringing up the rear with {}.", last.username, points(last.score)));
        }
    }

    lines.push(format!("Next up: {next_category}. The questions only get harder from here."));
    lines
}

fn biggest_climber<'a>(before: &[Standing], after: &'a [Standing]) -> Option<(&'a Standing, u32)> {
    let previous_rank = |user_id: UserId| before.iter().find(|s| s.user_id == user_id).map(|s| s.rank);
    after
        .iter()
        .filter_map(|s| {
            let was = previous_rank(s.user_id)?;
            (was > s.rank).then(|| (s, was - s.rank))
        })
        // first-listed wins ties
        .fold(None, |best: Option<(&Standing, u32)>, candidate| match best {
            Some((_, top)) if top >= candidate.1 => best,
            _ => Some(candidate),
        })
}

/// Champion (if anyone scored) and closing lines for the victory screen.
pub fn victory_summary(standings: &[Standing], crush_name: &str) -> (Option<Standing>, Vec<String>) {
    let champion = standings.first().filter(|s| s.score > 0).cloned();
    let mut lines = Vec::new();

    match &champion {
        Some(winner) => {
            lines.push(format!(
                "{} wins {}'s heart with {}!",
                winner.username,
                crush_name,
                points(winner.score)
            ));
            for runner_up in standings.iter().skip(1).take(2) {
                lines.push(format!(
                    "#{} {} with {}.",
                    runner_up.rank,
                    runner_up.username,
                    points(runner_up.score)
                ));
            }
        }
        None => lines.push(format!("Nobody scored a single point. {crush_name} is still single.")),
    }
    lines.push("Head back to the lobby for a rematch.".to_owned());

    (champion, lines)
}
