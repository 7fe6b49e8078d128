use anyhow::{Context, Result};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow},
    Pool, QueryBuilder, Row, Sqlite, SqliteConnection,
};
use std::{
    collections::HashMap,
    fs,
    path::Path,
    slice,
    str::FromStr,
};
use tracing::debug;

use shared::domain::{IngredientId, RecipeId};

#[derive(Clone)]
pub struct Storage {
    pool: Pool<Sqlite>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredIngredient {
    pub ingredient_id: IngredientId,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredRecipe {
    pub recipe_id: RecipeId,
    pub name: String,
    pub description: String,
}

#[derive(Debug, Clone)]
pub struct IngredientWithRecipes {
    pub ingredient: StoredIngredient,
    pub recipes: Vec<StoredRecipe>,
}

#[derive(Debug, Clone)]
pub struct RecipeWithIngredients {
    pub recipe: StoredRecipe,
    pub ingredients: Vec<StoredIngredient>,
}

/// Outcome of an insert or update against a table whose `name` column is unique.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOutcome<T> {
    Written(T),
    /// The row addressed by id does not exist.
    Missing,
    /// Another row already holds the requested name.
    NameTaken,
}

/// Outcome of attaching or detaching an ingredient on a recipe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssociationChange {
    RecipeMissing,
    IngredientMissing,
    Applied {
        recipe: StoredRecipe,
        ingredient: StoredIngredient,
    },
    Unchanged {
        recipe: StoredRecipe,
        ingredient: StoredIngredient,
    },
}

impl Storage {
    pub async fn new(database_url: &str) -> Result<Self> {
        let connect_options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .foreign_keys(true);
        create_parent_dir(connect_options.get_filename())?;
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(connect_options)
            .await?;
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .context("failed to apply recipe catalog migrations")?;
        debug!(%database_url, "recipe catalog schema ready");
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    pub async fn health_check(&self) -> Result<()> {
        let _: i64 = sqlx::query_scalar("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .context("sqlite ping failed")?;
        Ok(())
    }

    pub async fn create_ingredient(&self, name: &str) -> Result<WriteOutcome<StoredIngredient>> {
        let mut tx = self.pool.begin().await?;
        let row = sqlx::query(
            "INSERT INTO ingredients (name) VALUES (?)
             ON CONFLICT(name) DO NOTHING
             RETURNING id, name",
        )
        .bind(name)
        .fetch_optional(&mut *tx)
        .await
        .context("failed to insert ingredient")?;
        tx.commit().await?;

        Ok(match row {
            Some(row) => WriteOutcome::Written(ingredient_from_row(&row)),
            None => WriteOutcome::NameTaken,
        })
    }

    pub async fn ingredient_by_id(
        &self,
        ingredient_id: IngredientId,
    ) -> Result<Option<IngredientWithRecipes>> {
        let mut conn = self.pool.acquire().await?;
        let Some(ingredient) = fetch_ingredient(&mut conn, ingredient_id).await? else {
            return Ok(None);
        };
        let mut recipes =
            recipes_by_ingredient(&mut conn, Some(slice::from_ref(&ingredient_id))).await?;
        Ok(Some(IngredientWithRecipes {
            recipes: recipes.remove(&ingredient_id).unwrap_or_default(),
            ingredient,
        }))
    }

    pub async fn ingredient_by_name(&self, name: &str) -> Result<Option<IngredientWithRecipes>> {
        let mut conn = self.pool.acquire().await?;
        let Some(ingredient) = fetch_ingredient_by_name(&mut conn, name).await? else {
            return Ok(None);
        };
        let ingredient_id = ingredient.ingredient_id;
        let mut recipes =
            recipes_by_ingredient(&mut conn, Some(slice::from_ref(&ingredient_id))).await?;
        Ok(Some(IngredientWithRecipes {
            recipes: recipes.remove(&ingredient_id).unwrap_or_default(),
            ingredient,
        }))
    }

    pub async fn list_ingredients(&self) -> Result<Vec<IngredientWithRecipes>> {
        let mut conn = self.pool.acquire().await?;
        let rows = sqlx::query("SELECT id, name FROM ingredients ORDER BY id")
            .fetch_all(&mut *conn)
            .await?;
        let mut recipes = recipes_by_ingredient(&mut conn, None).await?;

        Ok(rows
            .iter()
            .map(ingredient_from_row)
            .map(|ingredient| IngredientWithRecipes {
                recipes: recipes
                    .remove(&ingredient.ingredient_id)
                    .unwrap_or_default(),
                ingredient,
            })
            .collect())
    }

    pub async fn rename_ingredient(
        &self,
        ingredient_id: IngredientId,
        name: &str,
    ) -> Result<WriteOutcome<StoredIngredient>> {
        let mut tx = self.pool.begin().await?;
        let row = match sqlx::query(
            "UPDATE ingredients SET name = ? WHERE id = ?
             RETURNING id, name",
        )
        .bind(name)
        .bind(ingredient_id.0)
        .fetch_optional(&mut *tx)
        .await
        {
            Ok(row) => row,
            Err(err) if is_unique_violation(&err) => {
                tx.rollback().await?;
                return Ok(WriteOutcome::NameTaken);
            }
            Err(err) => return Err(err).context("failed to rename ingredient"),
        };
        let Some(row) = row else {
            tx.rollback().await?;
            return Ok(WriteOutcome::Missing);
        };
        tx.commit().await?;
        Ok(WriteOutcome::Written(ingredient_from_row(&row)))
    }

    /// Deletes an ingredient together with every recipe association that references it.
    pub async fn delete_ingredient(
        &self,
        ingredient_id: IngredientId,
    ) -> Result<Option<StoredIngredient>> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM recipe_ingredient WHERE ingredient_id = ?")
            .bind(ingredient_id.0)
            .execute(&mut *tx)
            .await?;
        let row = sqlx::query("DELETE FROM ingredients WHERE id = ? RETURNING id, name")
            .bind(ingredient_id.0)
            .fetch_optional(&mut *tx)
            .await?;
        let Some(row) = row else {
            tx.rollback().await?;
            return Ok(None);
        };

        tx.commit().await?;
        Ok(Some(ingredient_from_row(&row)))
    }

    pub async fn create_recipe(
        &self,
        name: &str,
        description: &str,
    ) -> Result<WriteOutcome<StoredRecipe>> {
        let mut tx = self.pool.begin().await?;
        let row = sqlx::query(
            "INSERT INTO recipes (name, description) VALUES (?, ?)
             ON CONFLICT(name) DO NOTHING
             RETURNING id, name, description",
        )
        .bind(name)
        .bind(description)
        .fetch_optional(&mut *tx)
        .await
        .context("failed to insert recipe")?;
        tx.commit().await?;

        Ok(match row {
            Some(row) => WriteOutcome::Written(recipe_from_row(&row)),
            None => WriteOutcome::NameTaken,
        })
    }

    pub async fn recipe_by_id(&self, recipe_id: RecipeId) -> Result<Option<RecipeWithIngredients>> {
        let mut conn = self.pool.acquire().await?;
        let Some(recipe) = fetch_recipe(&mut conn, recipe_id).await? else {
            return Ok(None);
        };
        let mut ingredients =
            ingredients_by_recipe(&mut conn, Some(slice::from_ref(&recipe_id))).await?;
        Ok(Some(RecipeWithIngredients {
            ingredients: ingredients.remove(&recipe_id).unwrap_or_default(),
            recipe,
        }))
    }

    pub async fn recipe_by_name(&self, name: &str) -> Result<Option<RecipeWithIngredients>> {
        let mut conn = self.pool.acquire().await?;
        let row = sqlx::query("SELECT id, name, description FROM recipes WHERE name = ?")
            .bind(name)
            .fetch_optional(&mut *conn)
            .await?;
        let Some(recipe) = row.as_ref().map(recipe_from_row) else {
            return Ok(None);
        };
        let recipe_id = recipe.recipe_id;
        let mut ingredients =
            ingredients_by_recipe(&mut conn, Some(slice::from_ref(&recipe_id))).await?;
        Ok(Some(RecipeWithIngredients {
            ingredients: ingredients.remove(&recipe_id).unwrap_or_default(),
            recipe,
        }))
    }

    pub async fn list_recipes(&self) -> Result<Vec<RecipeWithIngredients>> {
        let mut conn = self.pool.acquire().await?;
        let rows = sqlx::query("SELECT id, name, description FROM recipes ORDER BY id")
            .fetch_all(&mut *conn)
            .await?;
        let mut ingredients = ingredients_by_recipe(&mut conn, None).await?;

        Ok(rows
            .iter()
            .map(recipe_from_row)
            .map(|recipe| RecipeWithIngredients {
                ingredients: ingredients.remove(&recipe.recipe_id).unwrap_or_default(),
                recipe,
            })
            .collect())
    }

    pub async fn update_recipe(
        &self,
        recipe_id: RecipeId,
        name: &str,
        description: &str,
    ) -> Result<WriteOutcome<StoredRecipe>> {
        let mut tx = self.pool.begin().await?;
        let row = match sqlx::query(
            "UPDATE recipes SET name = ?, description = ? WHERE id = ?
             RETURNING id, name, description",
        )
        .bind(name)
        .bind(description)
        .bind(recipe_id.0)
        .fetch_optional(&mut *tx)
        .await
        {
            Ok(row) => row,
            Err(err) if is_unique_violation(&err) => {
                tx.rollback().await?;
                return Ok(WriteOutcome::NameTaken);
            }
            Err(err) => return Err(err).context("failed to update recipe"),
        };
        let Some(row) = row else {
            tx.rollback().await?;
            return Ok(WriteOutcome::Missing);
        };
        tx.commit().await?;
        Ok(WriteOutcome::Written(recipe_from_row(&row)))
    }

    /// Deletes a recipe together with its ingredient associations.
    pub async fn delete_recipe(&self, recipe_id: RecipeId) -> Result<Option<StoredRecipe>> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM recipe_ingredient WHERE recipe_id = ?")
            .bind(recipe_id.0)
            .execute(&mut *tx)
            .await?;
        let row = sqlx::query("DELETE FROM recipes WHERE id = ? RETURNING id, name, description")
            .bind(recipe_id.0)
            .fetch_optional(&mut *tx)
            .await?;
        let Some(row) = row else {
            tx.rollback().await?;
            return Ok(None);
        };

        tx.commit().await?;
        Ok(Some(recipe_from_row(&row)))
    }

    pub async fn attach_ingredient(
        &self,
        recipe_id: RecipeId,
        ingredient_name: &str,
    ) -> Result<AssociationChange> {
        let mut tx = self.pool.begin().await?;
        let Some(recipe) = fetch_recipe(&mut tx, recipe_id).await? else {
            tx.rollback().await?;
            return Ok(AssociationChange::RecipeMissing);
        };
        let Some(ingredient) = fetch_ingredient_by_name(&mut tx, ingredient_name).await? else {
            tx.rollback().await?;
            return Ok(AssociationChange::IngredientMissing);
        };

        let inserted = sqlx::query(
            "INSERT INTO recipe_ingredient (recipe_id, ingredient_id) VALUES (?, ?)
             ON CONFLICT(recipe_id, ingredient_id) DO NOTHING",
        )
        .bind(recipe.recipe_id.0)
        .bind(ingredient.ingredient_id.0)
        .execute(&mut *tx)
        .await?
        .rows_affected();
        tx.commit().await?;

        Ok(if inserted > 0 {
            AssociationChange::Applied { recipe, ingredient }
        } else {
            AssociationChange::Unchanged { recipe, ingredient }
        })
    }

    pub async fn detach_ingredient(
        &self,
        recipe_id: RecipeId,
        ingredient_name: &str,
    ) -> Result<AssociationChange> {
        let mut tx = self.pool.begin().await?;
        let Some(recipe) = fetch_recipe(&mut tx, recipe_id).await? else {
            tx.rollback().await?;
            return Ok(AssociationChange::RecipeMissing);
        };
        let Some(ingredient) = fetch_ingredient_by_name(&mut tx, ingredient_name).await? else {
            tx.rollback().await?;
            return Ok(AssociationChange::IngredientMissing);
        };

        let removed =
            sqlx::query("DELETE FROM recipe_ingredient WHERE recipe_id = ? AND ingredient_id = ?")
                .bind(recipe.recipe_id.0)
                .bind(ingredient.ingredient_id.0)
                .execute(&mut *tx)
                .await?
                .rows_affected();
        tx.commit().await?;

        Ok(if removed > 0 {
            AssociationChange::Applied { recipe, ingredient }
        } else {
            AssociationChange::Unchanged { recipe, ingredient }
        })
    }

    /// Returns every recipe that uses at least one of `ingredient_names`, each with its
    /// complete ingredient list. Names are matched exactly.
    pub async fn recipes_with_any_ingredient(
        &self,
        ingredient_names: &[String],
    ) -> Result<Vec<RecipeWithIngredients>> {
        if ingredient_names.is_empty() {
            return Ok(Vec::new());
        }

        let mut conn = self.pool.acquire().await?;
        let mut query = QueryBuilder::<Sqlite>::new(
            "SELECT DISTINCT r.id AS id, r.name AS name, r.description AS description
             FROM recipes r
             INNER JOIN recipe_ingredient ri ON ri.recipe_id = r.id
             INNER JOIN ingredients i ON i.id = ri.ingredient_id
             WHERE i.name IN (",
        );
        let mut names = query.separated(", ");
        for name in ingredient_names {
            names.push_bind(name.as_str());
        }
        names.push_unseparated(") ORDER BY r.id");

        let rows = query.build().fetch_all(&mut *conn).await?;
        let recipes: Vec<StoredRecipe> = rows.iter().map(recipe_from_row).collect();
        let recipe_ids: Vec<RecipeId> = recipes.iter().map(|r| r.recipe_id).collect();
        let mut ingredients = ingredients_by_recipe(&mut conn, Some(recipe_ids.as_slice())).await?;

        Ok(recipes
            .into_iter()
            .map(|recipe| RecipeWithIngredients {
                ingredients: ingredients.remove(&recipe.recipe_id).unwrap_or_default(),
                recipe,
            })
            .collect())
    }
}

async fn fetch_ingredient(
    conn: &mut SqliteConnection,
    ingredient_id: IngredientId,
) -> Result<Option<StoredIngredient>> {
    let row = sqlx::query("SELECT id, name FROM ingredients WHERE id = ?")
        .bind(ingredient_id.0)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(row.as_ref().map(ingredient_from_row))
}

async fn fetch_ingredient_by_name(
    conn: &mut SqliteConnection,
    name: &str,
) -> Result<Option<StoredIngredient>> {
    let row = sqlx::query("SELECT id, name FROM ingredients WHERE name = ?")
        .bind(name)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(row.as_ref().map(ingredient_from_row))
}

async fn fetch_recipe(
    conn: &mut SqliteConnection,
    recipe_id: RecipeId,
) -> Result<Option<StoredRecipe>> {
    let row = sqlx::query("SELECT id, name, description FROM recipes WHERE id = ?")
        .bind(recipe_id.0)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(row.as_ref().map(recipe_from_row))
}

/// Loads the recipes attached to each ingredient. `None` loads every association.
async fn recipes_by_ingredient(
    conn: &mut SqliteConnection,
    only: Option<&[IngredientId]>,
) -> Result<HashMap<IngredientId, Vec<StoredRecipe>>> {
    let mut query = QueryBuilder::<Sqlite>::new(
        "SELECT ri.ingredient_id AS owner_id, r.id AS id, r.name AS name, r.description AS description
         FROM recipe_ingredient ri
         INNER JOIN recipes r ON r.id = ri.recipe_id",
    );
    if let Some(ids) = only {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        query.push(" WHERE ri.ingredient_id IN (");
        let mut separated = query.separated(", ");
        for id in ids {
            separated.push_bind(id.0);
        }
        separated.push_unseparated(")");
    }
    query.push(" ORDER BY r.id");

    let rows = query.build().fetch_all(&mut *conn).await?;
    let mut grouped: HashMap<IngredientId, Vec<StoredRecipe>> = HashMap::new();
    for row in rows {
        grouped
            .entry(IngredientId(row.get::<i64, _>("owner_id")))
            .or_default()
            .push(recipe_from_row(&row));
    }
    Ok(grouped)
}

/// Loads the ingredients attached to each recipe. `None` loads every association.
async fn ingredients_by_recipe(
    conn: &mut SqliteConnection,
    only: Option<&[RecipeId]>,
) -> Result<HashMap<RecipeId, Vec<StoredIngredient>>> {
    let mut query = QueryBuilder::<Sqlite>::new(
        "SELECT ri.recipe_id AS owner_id, i.id AS id, i.name AS name
         FROM recipe_ingredient ri
         INNER JOIN ingredients i ON i.id = ri.ingredient_id",
    );
    if let Some(ids) = only {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        query.push(" WHERE ri.recipe_id IN (");
        let mut separated = query.separated(", ");
        for id in ids {
            separated.push_bind(id.0);
        }
        separated.push_unseparated(")");
    }
    query.push(" ORDER BY i.id");

    let rows = query.build().fetch_all(&mut *conn).await?;
    let mut grouped: HashMap<RecipeId, Vec<StoredIngredient>> = HashMap::new();
    for row in rows {
        grouped
            .entry(RecipeId(row.get::<i64, _>("owner_id")))
            .or_default()
            .push(ingredient_from_row(&row));
    }
    Ok(grouped)
}

fn ingredient_from_row(row: &SqliteRow) -> StoredIngredient {
    StoredIngredient {
        ingredient_id: IngredientId(row.get::<i64, _>("id")),
        name: row.get::<String, _>("name"),
    }
}

fn recipe_from_row(row: &SqliteRow) -> StoredRecipe {
    StoredRecipe {
        recipe_id: RecipeId(row.get::<i64, _>("id")),
        name: row.get::<String, _>("name"),
        description: row.get::<String, _>("description"),
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}

fn create_parent_dir(db_file: &Path) -> Result<()> {
    match db_file.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => fs::create_dir_all(dir)
            .with_context(|| format!("failed to create database directory '{}'", dir.display())),
        _ => Ok(()),
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
