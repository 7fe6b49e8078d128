use shared::{
    domain::{
        split_ingredient_names, IngredientId, RecipeId, MAX_DESCRIPTION_BYTES, MAX_NAME_BYTES,
    },
    error::{ApiError, ErrorCode},
    protocol::{IngredientDetail, IngredientSummary, MessageResponse, RecipeDetail, RecipeSummary},
};
use storage::{
    AssociationChange, IngredientWithRecipes, RecipeWithIngredients, Storage, StoredIngredient,
    StoredRecipe, WriteOutcome,
};
use tracing::{error, info, warn};

#[derive(Clone)]
pub struct ApiContext {
    pub storage: Storage,
}

pub async fn create_ingredient(ctx: &ApiContext, name: &str) -> Result<IngredientDetail, ApiError> {
    let name = validated_name(name, "ingredient")?;
    match ctx.storage.create_ingredient(name).await.map_err(internal)? {
        WriteOutcome::Written(ingredient) => {
            info!(ingredient_id = ingredient.ingredient_id.0, name, "ingredient created");
            Ok(IngredientDetail {
                id: ingredient.ingredient_id,
                name: ingredient.name,
                recipes: Vec::new(),
            })
        }
        WriteOutcome::NameTaken | WriteOutcome::Missing => Err(rejected(ApiError::conflict(
            format!("Ingredient {name} already exists."),
        ))),
    }
}

pub async fn ingredient_by_id(
    ctx: &ApiContext,
    ingredient_id: IngredientId,
) -> Result<IngredientDetail, ApiError> {
    ctx.storage
        .ingredient_by_id(ingredient_id)
        .await
        .map_err(internal)?
        .map(ingredient_detail)
        .ok_or_else(|| ApiError::not_found(format!("No ingredient with id {}", ingredient_id.0)))
}

pub async fn ingredient_by_name(
    ctx: &ApiContext,
    name: &str,
) -> Result<IngredientDetail, ApiError> {
    ctx.storage
        .ingredient_by_name(name)
        .await
        .map_err(internal)?
        .map(ingredient_detail)
        .ok_or_else(|| ApiError::not_found(format!("No ingredient named {name}")))
}

pub async fn list_ingredients(ctx: &ApiContext) -> Result<Vec<IngredientDetail>, ApiError> {
    let ingredients = ctx.storage.list_ingredients().await.map_err(internal)?;
    Ok(ingredients.into_iter().map(ingredient_detail).collect())
}

pub async fn rename_ingredient(
    ctx: &ApiContext,
    ingredient_id: IngredientId,
    name: &str,
) -> Result<MessageResponse, ApiError> {
    let name = validated_name(name, "ingredient")?;
    match ctx
        .storage
        .rename_ingredient(ingredient_id, name)
        .await
        .map_err(internal)?
    {
        WriteOutcome::Written(ingredient) => {
            info!(ingredient_id = ingredient_id.0, name, "ingredient renamed");
            Ok(MessageResponse::new(format!(
                "Ingredient {} successfully updated.",
                ingredient.name
            )))
        }
        WriteOutcome::Missing => Err(rejected(ApiError::not_found(format!(
            "No ingredient with id {}",
            ingredient_id.0
        )))),
        WriteOutcome::NameTaken => Err(rejected(ApiError::conflict(format!(
            "Ingredient {name} already exists."
        )))),
    }
}

pub async fn delete_ingredient(
    ctx: &ApiContext,
    ingredient_id: IngredientId,
) -> Result<MessageResponse, ApiError> {
    let Some(ingredient) = ctx
        .storage
        .delete_ingredient(ingredient_id)
        .await
        .map_err(internal)?
    else {
        return Err(rejected(ApiError::not_found(format!(
            "No ingredient with id {}",
            ingredient_id.0
        ))));
    };
    info!(ingredient_id = ingredient_id.0, "ingredient deleted");
    Ok(MessageResponse::new(format!(
        "Ingredient {} successfully deleted.",
        ingredient.name
    )))
}

pub async fn create_recipe(
    ctx: &ApiContext,
    name: &str,
    description: &str,
) -> Result<RecipeDetail, ApiError> {
    let name = validated_name(name, "recipe")?;
    let description = validated_description(description)?;
    match ctx
        .storage
        .create_recipe(name, description)
        .await
        .map_err(internal)?
    {
        WriteOutcome::Written(recipe) => {
            info!(recipe_id = recipe.recipe_id.0, name, "recipe created");
            Ok(RecipeDetail {
                id: recipe.recipe_id,
                name: recipe.name,
                description: recipe.description,
                ingredients: Vec::new(),
            })
        }
        WriteOutcome::NameTaken | WriteOutcome::Missing => Err(rejected(ApiError::conflict(
            format!("Recipe {name} already exists."),
        ))),
    }
}

pub async fn recipe_by_id(ctx: &ApiContext, recipe_id: RecipeId) -> Result<RecipeDetail, ApiError> {
    ctx.storage
        .recipe_by_id(recipe_id)
        .await
        .map_err(internal)?
        .map(recipe_detail)
        .ok_or_else(|| ApiError::not_found(format!("No recipe with id {}", recipe_id.0)))
}

pub async fn recipe_by_name(ctx: &ApiContext, name: &str) -> Result<RecipeDetail, ApiError> {
    ctx.storage
        .recipe_by_name(name)
        .await
        .map_err(internal)?
        .map(recipe_detail)
        .ok_or_else(|| ApiError::not_found(format!("No recipe named {name}")))
}

pub async fn list_recipes(ctx: &ApiContext) -> Result<Vec<RecipeDetail>, ApiError> {
    let recipes = ctx.storage.list_recipes().await.map_err(internal)?;
    Ok(recipes.into_iter().map(recipe_detail).collect())
}

pub async fn update_recipe(
    ctx: &ApiContext,
    recipe_id: RecipeId,
    name: &str,
    description: &str,
) -> Result<MessageResponse, ApiError> {
    let name = validated_name(name, "recipe")?;
    let description = validated_description(description)?;
    match ctx
        .storage
        .update_recipe(recipe_id, name, description)
        .await
        .map_err(internal)?
    {
        WriteOutcome::Written(recipe) => {
            info!(recipe_id = recipe_id.0, name, "recipe updated");
            Ok(MessageResponse::new(format!(
                "Recipe {} successfully updated.",
                recipe.name
            )))
        }
        WriteOutcome::Missing => Err(rejected(ApiError::not_found(format!(
            "No recipe with id {}",
            recipe_id.0
        )))),
        WriteOutcome::NameTaken => Err(rejected(ApiError::conflict(format!(
            "Recipe {name} already exists."
        )))),
    }
}

pub async fn delete_recipe(
    ctx: &ApiContext,
    recipe_id: RecipeId,
) -> Result<MessageResponse, ApiError> {
    let Some(recipe) = ctx
        .storage
        .delete_recipe(recipe_id)
        .await
        .map_err(internal)?
    else {
        return Err(rejected(ApiError::not_found(format!(
            "No recipe with id {}",
            recipe_id.0
        ))));
    };
    info!(recipe_id = recipe_id.0, "recipe deleted");
    Ok(MessageResponse::new(format!(
        "Recipe {} successfully deleted.",
        recipe.name
    )))
}

/// Attaches an ingredient, looked up by exact name, to a recipe. Attaching an
/// ingredient that is already present is not an error.
pub async fn add_ingredient_to_recipe(
    ctx: &ApiContext,
    recipe_id: RecipeId,
    ingredient_name: &str,
) -> Result<MessageResponse, ApiError> {
    let change = ctx
        .storage
        .attach_ingredient(recipe_id, ingredient_name)
        .await
        .map_err(internal)?;
    match change {
        AssociationChange::Applied { recipe, ingredient } => {
            info!(
                recipe_id = recipe_id.0,
                ingredient_id = ingredient.ingredient_id.0,
                "ingredient attached"
            );
            Ok(MessageResponse::new(format!(
                "Ingredient {} successfully added to recipe {}.",
                ingredient.name, recipe.name
            )))
        }
        AssociationChange::Unchanged { .. } => {
            Ok(MessageResponse::new("Ingredient already in recipe"))
        }
        missing => Err(missing_association_party(missing)),
    }
}

pub async fn remove_ingredient_from_recipe(
    ctx: &ApiContext,
    recipe_id: RecipeId,
    ingredient_name: &str,
) -> Result<MessageResponse, ApiError> {
    let change = ctx
        .storage
        .detach_ingredient(recipe_id, ingredient_name)
        .await
        .map_err(internal)?;
    match change {
        AssociationChange::Applied { recipe, ingredient } => {
            info!(
                recipe_id = recipe_id.0,
                ingredient_id = ingredient.ingredient_id.0,
                "ingredient detached"
            );
            Ok(MessageResponse::new(format!(
                "Ingredient {} successfully removed from recipe {}.",
                ingredient.name, recipe.name
            )))
        }
        AssociationChange::Unchanged { .. } => Ok(MessageResponse::new("Ingredient not in recipe")),
        missing => Err(missing_association_party(missing)),
    }
}

/// Finds every recipe using at least one ingredient from a comma-separated list.
pub async fn search_recipes_by_ingredients(
    ctx: &ApiContext,
    ingredient_names: &str,
) -> Result<Vec<RecipeDetail>, ApiError> {
    let names = split_ingredient_names(ingredient_names);
    if names.is_empty() {
        return Err(rejected(ApiError::validation(
            "at least one ingredient name is required",
        )));
    }
    let recipes = ctx
        .storage
        .recipes_with_any_ingredient(&names)
        .await
        .map_err(internal)?;
    Ok(recipes.into_iter().map(recipe_detail).collect())
}

fn missing_association_party(change: AssociationChange) -> ApiError {
    let err = match change {
        AssociationChange::RecipeMissing => ApiError::not_found("No such Recipe exists"),
        AssociationChange::IngredientMissing => ApiError::not_found("No such Ingredient exists"),
        AssociationChange::Applied { .. } | AssociationChange::Unchanged { .. } => {
            ApiError::new(ErrorCode::Internal, "association change was not a lookup failure")
        }
    };
    rejected(err)
}

fn validated_name<'a>(name: &'a str, kind: &str) -> Result<&'a str, ApiError> {
    if name.trim().is_empty() {
        return Err(rejected(ApiError::validation(format!(
            "{kind} name cannot be empty"
        ))));
    }
    if name.len() > MAX_NAME_BYTES {
        return Err(rejected(ApiError::validation(format!(
            "{kind} name exceeds {MAX_NAME_BYTES} bytes"
        ))));
    }
    Ok(name)
}

fn validated_description(description: &str) -> Result<&str, ApiError> {
    if description.len() > MAX_DESCRIPTION_BYTES {
        return Err(rejected(ApiError::validation(format!(
            "description exceeds {MAX_DESCRIPTION_BYTES} bytes"
        ))));
    }
    Ok(description)
}

fn ingredient_detail(stored: IngredientWithRecipes) -> IngredientDetail {
    IngredientDetail {
        id: stored.ingredient.ingredient_id,
        name: stored.ingredient.name,
        recipes: stored.recipes.into_iter().map(recipe_summary).collect(),
    }
}

fn recipe_detail(stored: RecipeWithIngredients) -> RecipeDetail {
    RecipeDetail {
        id: stored.recipe.recipe_id,
        name: stored.recipe.name,
        description: stored.recipe.description,
        ingredients: stored.ingredients.into_iter().map(ingredient_summary).collect(),
    }
}

fn recipe_summary(recipe: StoredRecipe) -> RecipeSummary {
    RecipeSummary {
        id: recipe.recipe_id,
        name: recipe.name,
        description: recipe.description,
    }
}

fn ingredient_summary(ingredient: StoredIngredient) -> IngredientSummary {
    IngredientSummary {
        id: ingredient.ingredient_id,
        name: ingredient.name,
    }
}

fn rejected(err: ApiError) -> ApiError {
    warn!(code = ?err.code, message = %err.message, "request rejected");
    err
}

fn internal(err: anyhow::Error) -> ApiError {
    error!("storage failure: {err:#}");
    ApiError::new(ErrorCode::Internal, err.to_string())
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
