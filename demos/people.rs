//! Demo: people and their pets behind role policies. Needs a reachable
//! PostgreSQL (DATABASE_URL, default postgres://localhost/crudgate).

use crudgate::{
    resolve, ColumnConfig, Crud, Paginator, Policy, Readset, Ref, SanitizeContext, Sanitizer,
    TableConfig,
};
use serde_json::{json, Map, Value};
use std::sync::Arc;

fn column(name: &str, pg_type: &str, has_default: bool) -> ColumnConfig {
    ColumnConfig {
        name: name.into(),
        type_: Some(pg_type.into()),
        nullable: true,
        has_default,
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("crudgate=debug")),
        )
        .init();

    let database_url = std::env::var("DATABASE_URL")
        .unwrap_or_else(|_| "postgres://localhost/crudgate".into());
    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS people (
            id BIGSERIAL PRIMARY KEY,
            name TEXT,
            email TEXT
        )",
    )
    .execute(&pool)
    .await?;
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS pets (
            id BIGSERIAL PRIMARY KEY,
            name TEXT,
            owner_id BIGINT
        )",
    )
    .execute(&pool)
    .await?;

    let people = Arc::new(resolve(&TableConfig {
        name: "people".into(),
        schema: "public".into(),
        primary_key: "id".into(),
        columns: vec![
            column("id", "bigserial", true),
            column("name", "text", false),
            column("email", "text", false),
        ],
    })?);
    let pets = Arc::new(resolve(&TableConfig {
        name: "pets".into(),
        schema: "public".into(),
        primary_key: "id".into(),
        columns: vec![
            column("id", "bigserial", true),
            column("name", "text", false),
            column("owner_id", "bigint", false),
        ],
    })?);

    let title_case = |s: &str| -> String {
        let mut chars = s.chars();
        match chars.next() {
            Some(first) => first.to_uppercase().chain(chars).collect(),
            None => String::new(),
        }
    };
    let person_sanitizer = Sanitizer::new(Arc::clone(&people)).on_field(
        "name",
        move |_, data, field| {
            let s = data.get(field).and_then(Value::as_str).unwrap_or_default();
            Ok(Value::String(title_case(s)))
        },
    )?;

    let staff_people = Policy::new(
        Arc::clone(&people),
        Some(&["name"]),
        None,
        Some(&["name", "email"]),
    )?;
    let people_crud = Crud::new(staff_people.clone())
        .with_sanitizer(person_sanitizer)?
        .with_context(SanitizeContext::new().with("user", json!("demo")));

    let mut person = Map::new();
    person.insert("name".into(), json!("molly"));
    person.insert("email".into(), json!("molly@example.net"));
    let person = people_crud.create(&pool, person).await?;
    tracing::info!(person = %person, "created");

    // Pets scoped to this owner: the owner_id is fixed, not client-supplied.
    let owner_ref = Ref::new(
        "owner",
        Readset::new(Arc::clone(&people), Some(&["id", "name"]))?,
        "owner_id",
        "id",
    )?;
    let pets_crud = Crud::new(Policy::open(Arc::clone(&pets)))
        .with_ref(owner_ref)?
        .with_table_attr("kind")
        .fix([("owner_id".to_string(), person["id"].clone())])?;

    let mut pet = Map::new();
    pet.insert("name".into(), json!("Rex"));
    let pet = pets_crud.create(&pool, pet).await?;
    println!("{}", serde_json::to_string_pretty(&pet)?);

    // A narrowed policy can only lose fields, never gain them.
    let public_people = staff_people.narrow(Some(&["name"]), Some(&[]), None)?;
    let public_crud = Crud::new(public_people);
    for row in public_crud.fetch(&pool, &[]).await? {
        println!("{row}");
    }

    let pages = Paginator::new(pets_crud.clone(), 10)?;
    let count = pages.page_count(&pool, &[]).await?;
    let first = pages.page(&pool, 0, &[]).await?;
    println!("{count} page(s); first page has {} row(s)", first.len());

    Ok(())
}
