//! Standings.

use crushparty_protocol::Standing;

use crate::state::User;

/// Sorts seated players by score, highest first. Ties keep join order;
/// `rank` is the 1-based position.
///
/// Disconnected players stay on the board with their frozen score.
pub fn compute_standings(users: &[User]) -> Vec<Standing> {
    let mut ordered: Vec<&User> = users.iter().collect();
    // stable: equal scores stay in join order
    ordered.sort_by(|a, b| b.score.cmp(&a.score));
    ordered
        .into_iter()
        .enumerate()
        .map(|(i, u)| Standing {
            rank: i as u32 + 1,
            user_id: u.user_id,
            username: u.username.clone(),
            avatar_name: u.avatar_name.clone(),
            score: u.score,
        })
        .collect()
}
