//! Walks a small blog schema through an in-memory SQLite database.
//!
//! Run with `RUST_LOG=elif_entity=debug` to see every statement the engine
//! issues.

use elif_entity::{
    field_values, DatabaseConfig, DriverRegistry, Entity, EntityManager, NoRelations,
    RelationDirective, RelationName, RelationSlots,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing_subscriber::EnvFilter;

const CONFIG: &str = r#"
default: development
connections:
  development:
    driver: sqlite
    database: ":memory:"
"#;

#[derive(Debug, Clone, Copy)]
enum PostRelation {
    Comments,
}

impl RelationName for PostRelation {
    fn name(&self) -> &'static str {
        "comments"
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct Post {
    id: i64,
    title: String,
    #[serde(skip)]
    relations: RelationSlots,
}

impl Entity for Post {
    type Relation = PostRelation;

    fn relations() -> Vec<RelationDirective> {
        vec![RelationDirective::has_many::<Comment>("comments").dependent()]
    }

    fn relation_slots(&self) -> &RelationSlots {
        &self.relations
    }

    fn relation_slots_mut(&mut self) -> &mut RelationSlots {
        &mut self.relations
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct Comment {
    id: i64,
    post_id: i64,
    body: String,
    #[serde(skip)]
    relations: RelationSlots,
}

impl Entity for Comment {
    type Relation = NoRelations;

    fn relation_slots(&self) -> &RelationSlots {
        &self.relations
    }

    fn relation_slots_mut(&mut self) -> &mut RelationSlots {
        &mut self.relations
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = DatabaseConfig::from_yaml_str(CONFIG)?;
    let mut manager = EntityManager::from_config(&config, &DriverRegistry::with_defaults())?;
    manager.connect().await?;

    manager
        .execute("CREATE TABLE posts (id INTEGER PRIMARY KEY, title TEXT NOT NULL)", &[])
        .await?;
    manager
        .execute(
            "CREATE TABLE comments (id INTEGER PRIMARY KEY, post_id INTEGER NOT NULL, body TEXT NOT NULL)",
            &[],
        )
        .await?;

    let post_id = manager
        .create::<Post>(field_values(json!({"title": "Hello, relations"}))?)
        .await?
        .and_then(|id| id.as_i64())
        .unwrap_or_default();
    for body in ["Nice post", "Thanks for sharing"] {
        manager
            .create::<Comment>(field_values(json!({"post_id": post_id, "body": body}))?)
            .await?;
    }

    let mut post: Post = manager
        .find_one_by(json!({"id": post_id}))
        .await?
        .ok_or_else(|| anyhow::anyhow!("post {} vanished", post_id))?;

    let title = post.title.clone();
    let comments = manager.resolve::<Post, Comment>(&mut post, PostRelation::Comments).await?;
    println!("'{}' has {} comment(s):", title, comments.len());
    for comment in comments.as_slice() {
        println!("  #{} {}", comment.id, comment.body);
    }

    let removed = manager.delete::<Post, _>(json!({"id": post_id})).await?;
    let remaining = manager.count::<Comment, _>(json!({"post_id": post_id})).await?;
    println!("Deleted {} post(s); {} comment(s) remain", removed, remaining);

    manager.disconnect().await?;
    Ok(())
}
