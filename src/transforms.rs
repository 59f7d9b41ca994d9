//! The transform catalog: named instructions the user can apply to a
//! selection. Stored in the sync store; the list is returned most recently
//! used first so shortcut cycling starts from what the user last reached
//! for.

use log::warn;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::history::TransformSummary;
use crate::store::{Store, Stores};

pub const TRANSFORMS_KEY: &str = "transforms";
pub const CURRENT_TRANSFORM_KEY: &str = "current_transform";

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Transform {
    pub emoji: String,
    pub title: String,
    pub instructions: String,
}

impl Transform {
    pub fn display_name(&self) -> String {
        format!("{} {}", self.emoji, self.title)
    }
}

pub fn default_transforms() -> Vec<Transform> {
    vec![
        Transform {
            emoji: "\u{267e}\u{fe0f}".to_string(),
            title: "Create LaTeX".to_string(),
            instructions: "Write LaTeX code from the following description.".to_string(),
        },
        Transform {
            emoji: "\u{270d}\u{fe0f}".to_string(),
            title: "Create Markdown".to_string(),
            instructions: "Write Markdown from the following description.".to_string(),
        },
        Transform {
            emoji: "\u{1f1fa}\u{1f1f8}".to_string(),
            title: "Translate to English".to_string(),
            instructions: "Translate the following text to English.".to_string(),
        },
        Transform {
            emoji: "\u{1f1ea}\u{1f1f8}".to_string(),
            title: "Translate to Spanish".to_string(),
            instructions: "Translate the following text to Spanish.".to_string(),
        },
        Transform {
            emoji: "\u{262f}\u{fe0f}".to_string(),
            title: "Simplify".to_string(),
            instructions: "Rewrite the following text so a child could understand it."
                .to_string(),
        },
    ]
}

/// Sorts transforms by recency of use: the transform whose title appears
/// latest in `history` comes first; never-used transforms keep their stored
/// order at the end.
fn sort_most_recently_used(transforms: &mut [Transform], history: &[TransformSummary]) {
    let mut last_use: HashMap<&str, usize> = HashMap::new();
    for (i, summary) in history.iter().enumerate() {
        last_use.insert(summary.transform.as_str(), i);
    }
    // Stable sort keeps the stored order among never-used transforms.
    transforms.sort_by_key(|t| std::cmp::Reverse(last_use.get(t.title.as_str()).copied()));
}

/// The transform list, most recently used first. Seeds the stock transforms
/// on first use.
pub fn get_transforms(stores: &Stores) -> Vec<Transform> {
    let mut transforms: Vec<Transform> = match stores.sync.get(TRANSFORMS_KEY) {
        Some(transforms) => transforms,
        None => {
            let defaults = default_transforms();
            if let Err(e) = stores.sync.set(TRANSFORMS_KEY, &defaults) {
                warn!("Failed to seed default transforms: {}", e);
            }
            defaults
        }
    };
    let history = crate::history::get_history(&stores.local);
    sort_most_recently_used(&mut transforms, &history);
    transforms
}

pub fn save_transforms(store: &Store, transforms: &[Transform]) {
    if let Err(e) = store.set(TRANSFORMS_KEY, &transforms) {
        warn!("Failed to save transforms: {}", e);
    }
}

/// The transform the next run will apply, by title.
pub fn get_current_transform(stores: &Stores) -> Option<Transform> {
    let title: String = stores.local.get(CURRENT_TRANSFORM_KEY)?;
    get_transforms(stores).into_iter().find(|t| t.title == title)
}

pub fn set_current_transform(store: &Store, title: &str) {
    if let Err(e) = store.set(CURRENT_TRANSFORM_KEY, &title) {
        warn!("Failed to persist current transform: {}", e);
    }
}

/// Advances to the next transform in MRU order, wrapping around. Returns
/// the newly current transform, or `None` when the catalog is empty.
pub fn cycle_current_transform(stores: &Stores) -> Option<Transform> {
    let transforms = get_transforms(stores);
    if transforms.is_empty() {
        return None;
    }
    let current: Option<String> = stores.local.get(CURRENT_TRANSFORM_KEY);
    let next_index = match current.and_then(|title| {
        transforms.iter().position(|t| t.title == title)
    }) {
        Some(i) => (i + 1) % transforms.len(),
        None => 0,
    };
    let next = transforms[next_index].clone();
    set_current_transform(&stores.local, &next.title);
    Some(next)
}
