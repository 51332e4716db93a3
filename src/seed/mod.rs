//! Demo data seeding.
//!
//! Generates users, posts with a random published flag, and comments spread cyclically across
//! posts. Authors are assigned to posts cyclically as well.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

use crate::db::Repository;
use crate::errors::AppError;
use crate::models::{NewPost, NewUser};

const FIRST_NAMES: &[&str] = &[
    "Ada", "Alan", "Barbara", "Dennis", "Edsger", "Frances", "Grace", "Guido", "Ken", "Linus",
    "Margaret", "Niklaus", "Radia", "Shafi", "Tim", "Yukihiro",
];

const WORDS: &[&str] = &[
    "lorem", "ipsum", "dolor", "sit", "amet", "consectetur", "adipiscing", "elit", "sed", "do",
    "eiusmod", "tempor", "incididunt", "ut", "labore", "et", "dolore", "magna", "aliqua", "enim",
    "minim", "veniam", "quis", "nostrud", "exercitation", "ullamco", "laboris", "nisi", "aliquip",
    "commodo", "consequat",
];

/// How much data to generate.
#[derive(Debug, Clone)]
pub struct SeedPlan {
    pub users: usize,
    pub posts: usize,
    pub comments: usize,
    /// Probability that a generated post is published
    pub publish_probability: f64,
    /// Seed of the random generator, for reproducible data
    pub rng_seed: u64,
}

impl Default for SeedPlan {
    fn default() -> Self {
        Self {
            users: 100,
            posts: 1000,
            comments: 10000,
            publish_probability: 0.5,
            rng_seed: 42,
        }
    }
}

/// Counts of rows inserted by [`seed`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeedReport {
    pub users: usize,
    pub posts: usize,
    pub published: usize,
    pub comments: usize,
}

/// Insert the data described by `plan`.
pub async fn seed(repo: &Repository, plan: &SeedPlan) -> Result<SeedReport, AppError> {
    if !(0.0..=1.0).contains(&plan.publish_probability) {
        return Err(AppError::Validation(
            "publish_probability must be within 0.0..=1.0".to_string(),
        ));
    }

    let mut rng = StdRng::seed_from_u64(plan.rng_seed);

    let users: Vec<NewUser> = (0..plan.users)
        .map(|i| {
            let name = FIRST_NAMES.choose(&mut rng).copied().unwrap_or("User");
            NewUser {
                name: Some(name.to_string()),
                email: format!("{}.{}@example.com", name.to_ascii_lowercase(), i + 1),
            }
        })
        .collect();
    let user_ids = repo.insert_users(&users).await?;

    let posts: Vec<NewPost> = (0..plan.posts)
        .map(|i| NewPost {
            title: random_word(&mut rng).to_string(),
            content: Some(random_paragraph(&mut rng)),
            published: rng.gen_bool(plan.publish_probability),
            author_id: cyclical(&user_ids, i),
        })
        .collect();
    let published = posts.iter().filter(|p| p.published).count();
    let post_ids = repo.insert_posts(&posts).await?;

    let comments: Vec<_> = (0..plan.comments)
        .filter_map(|i| cyclical(&post_ids, i).map(|post_id| (post_id, random_paragraph(&mut rng))))
        .collect();
    let comment_count = repo.insert_comments(&comments).await?;

    Ok(SeedReport {
        users: user_ids.len(),
        posts: post_ids.len(),
        published,
        comments: comment_count,
    })
}

/// Seed only when the store holds no posts yet. Returns `None` when skipped.
pub async fn seed_if_empty(
    repo: &Repository,
    plan: &SeedPlan,
) -> Result<Option<SeedReport>, AppError> {
    if repo.count_posts().await? > 0 {
        return Ok(None);
    }
    seed(repo, plan).await.map(Some)
}

fn cyclical<T: Copy>(items: &[T], index: usize) -> Option<T> {
    if items.is_empty() {
        None
    } else {
        Some(items[index % items.len()])
    }
}

fn random_word(rng: &mut StdRng) -> &'static str {
    WORDS.choose(rng).copied().unwrap_or("lorem")
}

fn random_paragraph(rng: &mut StdRng) -> String {
    let len = rng.gen_range(8..24);
    let words: Vec<&str> = (0..len).map(|_| random_word(rng)).collect();
    let mut paragraph = words.join(" ");
    if let Some(first) = paragraph.get_mut(0..1) {
        first.make_ascii_uppercase();
    }
    paragraph.push('.');
    paragraph
}
