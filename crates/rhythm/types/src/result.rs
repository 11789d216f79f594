use serde::{Deserialize, Serialize};

use crate::post::{Post, PostId};
use crate::request::SortType;

/// Finished, ranked output of a Rhythm run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SortResult {
    pub posts: Vec<Post>,
    pub sort_type: SortType,
    #[serde(default)]
    pub top_parent_post_id: Option<PostId>,
}

/// Keep scored posts and order them by descending score.
///
/// The sort is stable, so posts with equal scores keep their fetch order.
pub fn rank_posts(posts: Vec<Post>) -> Vec<Post> {
    let mut scored: Vec<Post> = posts.into_iter().filter(Post::is_scored).collect();
    scored.sort_by(|a, b| {
        let a = a.sort.unwrap_or(f64::NEG_INFINITY);
        let b = b.sort.unwrap_or(f64::NEG_INFINITY);
        b.total_cmp(&a)
    });
    scored
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::post::{Author, StreamRef};
    use proptest::prelude::*;

    fn post(id: PostId, sort: Option<f64>) -> Post {
        let mut post = Post::new(
            id,
            id as i64,
            Author::new("d", "u"),
            StreamRef::new("d", "u", "s", "1"),
        );
        post.sort = sort;
        post
    }

    #[test]
    fn drops_unscored_and_orders_descending() {
        let ranked = rank_posts(vec![post(1, Some(5.0)), post(2, None), post(3, Some(9.0))]);
        let ids: Vec<PostId> = ranked.iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![3, 1]);
        assert_eq!(ranked[0].sort, Some(9.0));
    }

    #[test]
    fn ties_keep_fetch_order() {
        let ranked = rank_posts(vec![
            post(1, Some(2.0)),
            post(2, Some(7.0)),
            post(3, Some(2.0)),
            post(4, Some(2.0)),
        ]);
        let ids: Vec<PostId> = ranked.iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![2, 1, 3, 4]);
    }

    proptest! {
        #[test]
        fn inclusion_matches_scored_posts(scores in prop::collection::vec(prop::option::of(-1000i32..1000), 0..40)) {
            let posts: Vec<Post> = scores
                .iter()
                .enumerate()
                .map(|(i, s)| post(i as PostId, s.map(f64::from)))
                .collect();
            let expected = scores.iter().filter(|s| s.is_some()).count();

            let ranked = rank_posts(posts);
            prop_assert_eq!(ranked.len(), expected);
            prop_assert!(ranked.iter().all(Post::is_scored));
        }

        #[test]
        fn output_is_descending_and_stable(scores in prop::collection::vec(-20i32..20, 0..40)) {
            let posts: Vec<Post> = scores
                .iter()
                .enumerate()
                .map(|(i, s)| post(i as PostId, Some(f64::from(*s))))
                .collect();

            let ranked = rank_posts(posts);
            for pair in ranked.windows(2) {
                let (a, b) = (pair[0].sort.unwrap(), pair[1].sort.unwrap());
                prop_assert!(a >= b);
                if a == b {
                    prop_assert!(pair[0].id < pair[1].id);
                }
            }
        }
    }
}
