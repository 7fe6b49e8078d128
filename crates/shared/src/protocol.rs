use serde::{Deserialize, Serialize};

use crate::domain::{IngredientId, RecipeId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngredientSummary {
    pub id: IngredientId,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecipeSummary {
    pub id: RecipeId,
    pub name: String,
    pub description: String,
}

/// An ingredient with every recipe that uses it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngredientDetail {
    pub id: IngredientId,
    pub name: String,
    pub recipes: Vec<RecipeSummary>,
}

/// A recipe with every ingredient attached to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecipeDetail {
    pub id: RecipeId,
    pub name: String,
    pub description: String,
    pub ingredients: Vec<IngredientSummary>,
}

impl RecipeDetail {
    pub fn ingredient_names(&self) -> Vec<&str> {
        self.ingredients.iter().map(|i| i.name.as_str()).collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateIngredientRequest {
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenameIngredientRequest {
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateRecipeRequest {
    pub name: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateRecipeRequest {
    pub name: String,
    #[serde(default)]
    pub description: String,
}

/// Status result for operations that do not return an entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::split_ingredient_names;

    #[test]
    fn recipe_detail_serializes_ids_as_plain_integers() {
        let recipe = RecipeDetail {
            id: RecipeId(7),
            name: "Soup".into(),
            description: "Hot broth".into(),
            ingredients: vec![IngredientSummary {
                id: IngredientId(3),
                name: "Salt".into(),
            }],
        };
        let value = serde_json::to_value(&recipe).expect("json");
        assert_eq!(value["id"], 7);
        assert_eq!(value["ingredients"][0]["id"], 3);
        assert_eq!(value["ingredients"][0]["name"], "Salt");
    }

    #[test]
    fn create_recipe_request_defaults_description() {
        let req: CreateRecipeRequest =
            serde_json::from_str(r#"{"name":"Toast"}"#).expect("json");
        assert_eq!(req.description, "");
    }

    #[test]
    fn ingredient_list_is_split_without_normalising() {
        assert_eq!(
            split_ingredient_names("salt, Sugar,,salt"),
            vec!["salt", " Sugar", "salt"]
        );
        assert!(split_ingredient_names(",,").is_empty());
    }
}
