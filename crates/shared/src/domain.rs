use serde::{Deserialize, Serialize};

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name(pub i64);
    };
}

id_newtype!(RecipeId);
id_newtype!(IngredientId);

/// Longest accepted recipe or ingredient name, in bytes.
pub const MAX_NAME_BYTES: usize = 200;

/// Longest accepted recipe description, in bytes.
pub const MAX_DESCRIPTION_BYTES: usize = 4000;

/// Splits a comma-separated ingredient list into the names to match.
///
/// Names are kept exactly as written; only empty segments are dropped.
pub fn split_ingredient_names(raw: &str) -> Vec<String> {
    raw.split(',')
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .collect()
}
