use elif_entity::{
    field_values, DatabaseValue, Entity, EntityManager, NoRelations, OrmError, QueryDescriptor, Related,
    RelationDirective, RelationName, RelationSlots, SqliteDriver,
};
use serde::{Deserialize, Serialize};
use serde_json::json;

const SCHEMA: &[&str] = &[
    "CREATE TABLE authors (id INTEGER PRIMARY KEY, name TEXT NOT NULL)",
    "CREATE TABLE posts (id INTEGER PRIMARY KEY, author_id INTEGER, title TEXT NOT NULL, published BOOLEAN NOT NULL DEFAULT 0)",
    "CREATE TABLE comments (id INTEGER PRIMARY KEY, post_id INTEGER NOT NULL, body TEXT NOT NULL)",
    "CREATE TABLE tags (id INTEGER PRIMARY KEY, name TEXT NOT NULL)",
    "CREATE TABLE post_tag (post_id INTEGER NOT NULL, tag_id INTEGER NOT NULL)",
];

#[derive(Debug, Clone, Copy)]
enum AuthorRelation {
    Posts,
}

impl RelationName for AuthorRelation {
    fn name(&self) -> &'static str {
        match self {
            AuthorRelation::Posts => "posts",
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct Author {
    id: i64,
    name: String,
    #[serde(skip)]
    relations: RelationSlots,
}

impl Entity for Author {
    type Relation = AuthorRelation;

    fn relations() -> Vec<RelationDirective> {
        vec![RelationDirective::has_many::<Post>("posts")]
    }

    fn relation_slots(&self) -> &RelationSlots {
        &self.relations
    }

    fn relation_slots_mut(&mut self) -> &mut RelationSlots {
        &mut self.relations
    }
}

#[derive(Debug, Clone, Copy)]
enum PostRelation {
    Author,
    Comments,
    Tags,
}

impl RelationName for PostRelation {
    fn name(&self) -> &'static str {
        match self {
            PostRelation::Author => "author",
            PostRelation::Comments => "comments",
            PostRelation::Tags => "tags",
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct Post {
    id: i64,
    author_id: Option<i64>,
    title: String,
    published: bool,
    #[serde(skip)]
    relations: RelationSlots,
}

impl Entity for Post {
    type Relation = PostRelation;

    fn relations() -> Vec<RelationDirective> {
        vec![
            RelationDirective::belongs_to::<Author>("author"),
            RelationDirective::has_many::<Comment>("comments").dependent(),
            RelationDirective::has_and_belongs_to_many::<Tag>("tags").dependent(),
        ]
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

#[derive(Debug, Serialize, Deserialize)]
struct Tag {
    id: i64,
    name: String,
    #[serde(skip)]
    relations: RelationSlots,
}

impl Entity for Tag {
    type Relation = NoRelations;

    fn relation_slots(&self) -> &RelationSlots {
        &self.relations
    }

    fn relation_slots_mut(&mut self) -> &mut RelationSlots {
        &mut self.relations
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct Draft {
    id: i64,
    #[serde(skip)]
    relations: RelationSlots,
}

impl Entity for Draft {
    type Relation = NoRelations;

    fn relation_slots(&self) -> &RelationSlots {
        &self.relations
    }

    fn relation_slots_mut(&mut self) -> &mut RelationSlots {
        &mut self.relations
    }
}

fn key(value: Option<DatabaseValue>) -> i64 {
    value.and_then(|v| v.as_i64()).expect("generated key")
}

/// In-memory blog with one author, two posts, comments and tags
async fn seeded() -> anyhow::Result<EntityManager> {
    let mut manager = EntityManager::with_driver(SqliteDriver::in_memory());
    for statement in SCHEMA {
        manager.execute(statement, &[]).await?;
    }

    let ada = key(manager.create::<Author>(field_values(json!({"name": "Ada"}))?).await?);
    let first = key(
        manager
            .create::<Post>(field_values(json!({"author_id": ada, "title": "Engines", "published": true}))?)
            .await?,
    );
    let second = key(
        manager
            .create::<Post>(field_values(json!({"author_id": ada, "title": "Notes"}))?)
            .await?,
    );

    for body in ["First!", "Lovely"] {
        manager
            .create::<Comment>(field_values(json!({"post_id": first, "body": body}))?)
            .await?;
    }
    manager
        .create::<Comment>(field_values(json!({"post_id": second, "body": "Later"}))?)
        .await?;

    for name in ["math", "history"] {
        let tag = key(manager.create::<Tag>(field_values(json!({"name": name}))?).await?);
        manager
            .execute(
                "INSERT INTO post_tag (post_id, tag_id) VALUES (?, ?)",
                &[DatabaseValue::from(first), DatabaseValue::from(tag)],
            )
            .await?;
    }

    Ok(manager)
}

#[tokio::test]
async fn test_create_and_query() -> anyhow::Result<()> {
    let mut manager = seeded().await?;

    let published: Vec<Post> = manager.find_by(json!({"published": true})).await?;
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].title, "Engines");

    assert_eq!(manager.count::<Post, _>(json!({"published": false})).await?, 1);
    assert_eq!(manager.count::<Comment, _>(json!({"body LIKE": "L%"})).await?, 2);

    let ordered: Vec<Comment> = manager
        .find(QueryDescriptor::new().order_desc("id").limit(2))
        .await?;
    let bodies: Vec<&str> = ordered.iter().map(|c| c.body.as_str()).collect();
    assert_eq!(bodies, vec!["Later", "Lovely"]);

    let updated = manager
        .update::<Post, _>(json!({"title": "Notes"}), field_values(json!({"published": true}))?)
        .await?;
    assert_eq!(updated, 1);
    assert_eq!(manager.count::<Post, _>(json!({"published": true})).await?, 2);
    Ok(())
}

#[tokio::test]
async fn test_relations_resolve_against_database() -> anyhow::Result<()> {
    let mut manager = seeded().await?;

    let mut ada: Author = manager
        .find_one_by(json!({"name": "Ada"}))
        .await?
        .expect("author exists");
    let posts = manager.resolve::<Author, Post>(&mut ada, AuthorRelation::Posts).await?;
    assert_eq!(posts.len(), 2);

    let mut post: Post = manager
        .find_one_by(json!({"title": "Engines"}))
        .await?
        .expect("post exists");

    let author = manager.resolve::<Post, Author>(&mut post, PostRelation::Author).await?;
    assert_eq!(author.as_one().map(|a| a.name.as_str()), Some("Ada"));

    let comments = manager.resolve::<Post, Comment>(&mut post, PostRelation::Comments).await?;
    assert_eq!(comments.len(), 2);

    let tags = manager.resolve::<Post, Tag>(&mut post, PostRelation::Tags).await?;
    let mut names: Vec<&str> = tags.as_slice().iter().map(|t| t.name.as_str()).collect();
    names.sort_unstable();
    assert_eq!(names, vec!["history", "math"]);

    let mut orphan: Post = manager
        .find_one_by(json!({"title": "Notes"}))
        .await?
        .expect("post exists");
    let tags = manager.resolve::<Post, Tag>(&mut orphan, PostRelation::Tags).await?;
    assert!(matches!(tags, Related::Many(found) if found.is_empty()));
    Ok(())
}

#[tokio::test]
async fn test_dependent_delete_cascades() -> anyhow::Result<()> {
    let mut manager = seeded().await?;

    let deleted = manager.delete::<Post, _>(json!({"title": "Engines"})).await?;
    assert_eq!(deleted, 1);

    assert_eq!(manager.count::<Comment, _>(json!({"body": ["First!", "Lovely"]})).await?, 0);
    assert_eq!(manager.count::<Comment, _>(json!({"body": "Later"})).await?, 1);
    assert_eq!(manager.count::<Tag, _>(json!({"id >": 0})).await?, 2);

    let links = manager.execute("SELECT COUNT(*) AS count FROM post_tag", &[]).await?;
    assert_eq!(links.rows[0].get("count").and_then(DatabaseValue::as_i64), Some(0));
    Ok(())
}

#[tokio::test]
async fn test_rollback_discards_writes() -> anyhow::Result<()> {
    let mut manager = seeded().await?;

    manager.begin().await?;
    manager.create::<Tag>(field_values(json!({"name": "draft"}))?).await?;
    assert_eq!(manager.count::<Tag, _>(json!({"name": "draft"})).await?, 1);
    manager.rollback().await?;

    assert_eq!(manager.count::<Tag, _>(json!({"name": "draft"})).await?, 0);
    Ok(())
}

#[tokio::test]
async fn test_missing_table_and_unknown_column() -> anyhow::Result<()> {
    let mut manager = seeded().await?;

    let err = manager.find::<Draft>(QueryDescriptor::new()).await.unwrap_err();
    assert_eq!(
        err,
        OrmError::MissingTable {
            entity: "Draft".to_string(),
            table: "drafts".to_string(),
        }
    );

    let err = manager
        .create::<Tag>(field_values(json!({"colour": "red"}))?)
        .await
        .unwrap_err();
    assert!(matches!(err, OrmError::MissingSchema { .. }));
    Ok(())
}
