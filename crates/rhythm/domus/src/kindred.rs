//! Kindred derivation from historical takes.

use std::collections::HashMap;

use rhythm_types::{KindredMap, PostId};
use tracing::debug;

use crate::sources::{SourceResult, Take, TakeSource};

/// Derive `user`'s kindred map.
///
/// For every other user who took the same post on the same field, the score
/// moves by +1 when both takes have the same sign and by -1 otherwise.
pub fn derive_kindred(user: &str, own: &[Take], related: &[Take]) -> KindredMap {
    let mine: HashMap<(PostId, i64), i64> = own
        .iter()
        .filter(|t| t.user == user)
        .map(|t| ((t.post_id, t.field_id), t.value))
        .collect();

    let mut kindred = KindredMap::new();
    for take in related.iter().filter(|t| t.user != user) {
        if let Some(value) = mine.get(&(take.post_id, take.field_id)) {
            let delta = if value.signum() == take.value.signum() { 1 } else { -1 };
            kindred.adjust(&take.user, delta);
        }
    }
    kindred
}

/// Load the takes needed for `user` and derive the map.
pub async fn kindred_for(takes: &dyn TakeSource, user: &str) -> SourceResult<KindredMap> {
    let own = takes.takes_by_user(user, None).await?;
    let mut post_ids: Vec<PostId> = own.iter().map(|t| t.post_id).collect();
    post_ids.sort_unstable();
    post_ids.dedup();

    let related = takes.takes_on_posts(&post_ids, None).await?;
    let kindred = derive_kindred(user, &own, &related);
    debug!(user, entries = kindred.len(), "Kindred derived");
    Ok(kindred)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::InMemoryTakes;

    fn take(post_id: PostId, user: &str, field_id: i64, value: i64) -> Take {
        Take {
            post_id,
            user: user.to_string(),
            field_id,
            value,
        }
    }

    #[test]
    fn agreement_adds_and_disagreement_subtracts() {
        let own = vec![take(1, "d/ada", 0, 5), take(2, "d/ada", 0, -3)];
        let related = vec![
            take(1, "d/ada", 0, 5),
            take(1, "d/bo", 0, 2),
            take(2, "d/bo", 0, -1),
            take(1, "d/cy", 0, -4),
            take(1, "d/cy", 1, 9),
        ];

        let kindred = derive_kindred("d/ada", &own, &related);
        assert_eq!(kindred.score("d/bo"), 2);
        assert_eq!(kindred.score("d/cy"), -1);
        assert_eq!(kindred.score("d/ada"), 0);
        assert_eq!(kindred.len(), 2);
    }

    #[tokio::test]
    async fn derivation_reads_from_the_take_source() {
        let source = InMemoryTakes::new(vec![
            take(7, "d/ada", 0, 1),
            take(7, "d/bo", 0, 1),
            take(8, "d/bo", 0, 1),
        ]);
        let kindred = kindred_for(&source, "d/ada").await.unwrap();
        assert_eq!(kindred.score("d/bo"), 1);
    }
}
