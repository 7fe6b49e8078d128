use shared::domain::split_ingredient_names;
use storage::{AssociationChange, Storage, WriteOutcome};

#[tokio::test]
async fn catalog_survives_reopen_of_on_disk_database() {
    let temp_root = tempfile::tempdir().expect("tempdir");
    let db_path = temp_root.path().join("recipes.db");
    let database_url = format!("sqlite://{}", db_path.to_string_lossy().replace('\\', "/"));

    {
        let storage = Storage::new(&database_url).await.expect("db");
        storage.create_ingredient("Salt").await.expect("salt");
        storage.create_ingredient("Sugar").await.expect("sugar");
        let WriteOutcome::Written(soup) = storage
            .create_recipe("Soup", "Hot broth")
            .await
            .expect("soup")
        else {
            panic!("soup should be created");
        };
        let change = storage
            .attach_ingredient(soup.recipe_id, "Salt")
            .await
            .expect("attach");
        assert!(matches!(change, AssociationChange::Applied { .. }));
        storage.pool().close().await;
    }

    let storage = Storage::new(&database_url).await.expect("reopen");
    let soup = storage
        .recipe_by_name("Soup")
        .await
        .expect("lookup")
        .expect("soup persisted");
    let names: Vec<&str> = soup.ingredients.iter().map(|i| i.name.as_str()).collect();
    assert_eq!(names, vec!["Salt"]);

    let found = storage
        .recipes_with_any_ingredient(&split_ingredient_names("Sugar,Salt"))
        .await
        .expect("search");
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].recipe.name, "Soup");
}
