use serde::{Deserialize, Serialize};

/// Resource bounds applied to every Rhythm engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SandboxLimits {
    /// Operations allowed per hook call.
    #[serde(default = "default_max_operations")]
    pub max_operations: u64,

    /// Maximum script call depth.
    #[serde(default = "default_max_call_levels")]
    pub max_call_levels: usize,

    /// Maximum expression nesting depth.
    #[serde(default = "default_max_expr_depth")]
    pub max_expr_depth: usize,

    /// Maximum string length in bytes.
    #[serde(default = "default_max_string_size")]
    pub max_string_size: usize,

    /// Maximum array length.
    #[serde(default = "default_max_array_size")]
    pub max_array_size: usize,

    /// Maximum object map size.
    #[serde(default = "default_max_map_size")]
    pub max_map_size: usize,

    /// Largest quantity a Rhythm may ask for with `set_post_quantity`.
    #[serde(default = "default_max_posts")]
    pub max_posts: usize,

    /// Quantity fetched when the Rhythm does not declare one.
    #[serde(default = "default_post_quantity")]
    pub default_post_quantity: usize,
}

impl Default for SandboxLimits {
    fn default() -> Self {
        Self {
            max_operations: default_max_operations(),
            max_call_levels: default_max_call_levels(),
            max_expr_depth: default_max_expr_depth(),
            max_string_size: default_max_string_size(),
            max_array_size: default_max_array_size(),
            max_map_size: default_max_map_size(),
            max_posts: default_max_posts(),
            default_post_quantity: default_post_quantity(),
        }
    }
}

fn default_max_operations() -> u64 {
    1_000_000
}

fn default_max_call_levels() -> usize {
    32
}

fn default_max_expr_depth() -> usize {
    64
}

fn default_max_string_size() -> usize {
    256 * 1024
}

fn default_max_array_size() -> usize {
    10_000
}

fn default_max_map_size() -> usize {
    10_000
}

fn default_max_posts() -> usize {
    1_000
}

fn default_post_quantity() -> usize {
    100
}
