use std::sync::Arc;

use elif_entity::{
    testing::{RecordingDriver, RecordingHandle},
    ColumnInfo, DatabaseValue, Entity, EntityManager, OrmError, QueryDescriptor, Related, RelationDirective,
    RelationName, RelationSlots, RelationState, ResultSet, Row, SchemaCache,
};
use serde::{Deserialize, Serialize};
use serde_json::json;

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

#[derive(Debug, PartialEq, Serialize, Deserialize)]
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

#[derive(Debug, PartialEq, Serialize, Deserialize)]
struct Post {
    id: i64,
    author_id: Option<i64>,
    title: String,
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

#[derive(Debug, PartialEq, Serialize, Deserialize)]
struct Comment {
    id: i64,
    post_id: i64,
    body: String,
    #[serde(skip)]
    relations: RelationSlots,
}

impl Entity for Comment {
    type Relation = elif_entity::NoRelations;

    fn relation_slots(&self) -> &RelationSlots {
        &self.relations
    }

    fn relation_slots_mut(&mut self) -> &mut RelationSlots {
        &mut self.relations
    }
}

#[derive(Debug, PartialEq, Serialize, Deserialize)]
struct Tag {
    id: i64,
    name: String,
    #[serde(skip)]
    relations: RelationSlots,
}

impl Entity for Tag {
    type Relation = elif_entity::NoRelations;

    fn relation_slots(&self) -> &RelationSlots {
        &self.relations
    }

    fn relation_slots_mut(&mut self) -> &mut RelationSlots {
        &mut self.relations
    }
}

fn blog_driver() -> RecordingDriver {
    RecordingDriver::new()
        .with_table(
            "authors",
            vec![ColumnInfo::new("id", "INTEGER").primary_key(), ColumnInfo::new("name", "TEXT")],
        )
        .with_table(
            "posts",
            vec![
                ColumnInfo::new("id", "INTEGER").primary_key(),
                ColumnInfo::new("author_id", "INTEGER"),
                ColumnInfo::new("title", "TEXT"),
            ],
        )
        .with_table(
            "comments",
            vec![
                ColumnInfo::new("id", "INTEGER").primary_key(),
                ColumnInfo::new("post_id", "INTEGER"),
                ColumnInfo::new("body", "TEXT"),
            ],
        )
        .with_table(
            "tags",
            vec![ColumnInfo::new("id", "INTEGER").primary_key(), ColumnInfo::new("name", "TEXT")],
        )
}

fn blog() -> (EntityManager, RecordingHandle) {
    let driver = blog_driver();
    let handle = driver.handle();
    (EntityManager::with_driver(driver), handle)
}

fn post(id: i64, author_id: Option<i64>) -> Post {
    Post {
        id,
        author_id,
        title: format!("Post {}", id),
        relations: RelationSlots::new(),
    }
}

fn comment_row(id: i64, post_id: i64) -> Row {
    Row::new()
        .with("id", id)
        .with("post_id", post_id)
        .with("body", format!("comment {}", id))
}

#[tokio::test]
async fn test_hydrated_entities_start_unresolved() {
    let (mut manager, handle) = blog();
    handle.push_rows(vec![Row::new().with("id", 1i64).with("author_id", 2i64).with("title", "Hello")]);

    let posts: Vec<Post> = manager.find(QueryDescriptor::new()).await.unwrap();

    assert_eq!(handle.execute_count(), 1);
    assert_eq!(posts[0].relations.state("comments"), RelationState::Unresolved);
    assert_eq!(posts[0].relations.state("author"), RelationState::Unresolved);
}

#[tokio::test]
async fn test_first_access_queries_once_then_memoizes() {
    let (mut manager, handle) = blog();
    let mut post = post(5, Some(1));
    handle.push_rows(vec![comment_row(1, 5), comment_row(2, 5)]);

    let comments = manager
        .resolve::<Post, Comment>(&mut post, PostRelation::Comments)
        .await
        .unwrap();
    assert_eq!(comments.len(), 2);
    assert_eq!(handle.executed_sql(), vec!["SELECT * FROM comments WHERE post_id = ?"]);
    assert_eq!(handle.executed()[0].values, vec![DatabaseValue::Int32(5)]);

    let again = manager
        .resolve::<Post, Comment>(&mut post, PostRelation::Comments)
        .await
        .unwrap();
    assert_eq!(again.as_slice()[1].body, "comment 2");
    assert_eq!(handle.execute_count(), 1);
    assert!(post.relations.is_resolved("comments"));
}

#[tokio::test]
async fn test_belongs_to_resolves_single_entity() {
    let (mut manager, handle) = blog();
    let mut post = post(5, Some(7));
    handle.push_rows(vec![Row::new().with("id", 7i64).with("name", "Ada")]);

    let author = manager
        .resolve::<Post, Author>(&mut post, PostRelation::Author)
        .await
        .unwrap();

    assert_eq!(author.as_one().map(|a| a.name.as_str()), Some("Ada"));
    assert_eq!(handle.executed_sql(), vec!["SELECT * FROM authors WHERE id = ? LIMIT 1"]);
}

#[tokio::test]
async fn test_null_reference_resolves_empty_without_query() {
    let (mut manager, handle) = blog();
    let mut post = post(5, None);

    let author = manager
        .resolve::<Post, Author>(&mut post, PostRelation::Author)
        .await
        .unwrap();

    assert_eq!(author, &Related::One(None));
    assert_eq!(handle.execute_count(), 0);
}

#[tokio::test]
async fn test_has_many_with_no_rows_is_empty_collection() {
    let (mut manager, _handle) = blog();
    let mut author = Author {
        id: 3,
        name: "Grace".to_string(),
        relations: RelationSlots::new(),
    };

    let posts = manager
        .resolve::<Author, Post>(&mut author, AuthorRelation::Posts)
        .await
        .unwrap();
    assert_eq!(posts, &Related::Many(Vec::new()));
}

#[tokio::test]
async fn test_many_to_many_goes_through_join_table() {
    let (mut manager, handle) = blog();
    let mut post = post(3, Some(1));
    handle.push_rows(vec![
        Row::new().with("id", 1i64).with("name", "rust"),
        Row::new().with("id", 2i64).with("name", "sql"),
    ]);

    let tags = manager
        .resolve::<Post, Tag>(&mut post, PostRelation::Tags)
        .await
        .unwrap();

    let names: Vec<&str> = tags.as_slice().iter().map(|t| t.name.as_str()).collect();
    assert_eq!(names, vec!["rust", "sql"]);
    assert_eq!(
        handle.executed_sql(),
        vec!["SELECT tags.* FROM tags INNER JOIN post_tag ON post_tag.tag_id = tags.id WHERE post_tag.post_id = ?"]
    );
}

#[tokio::test]
async fn test_unknown_relation_never_queries() {
    let (mut manager, handle) = blog();
    let mut post = post(1, None);

    let err = manager
        .resolve_named::<Post, Comment>(&mut post, "likes")
        .await
        .unwrap_err();

    assert_eq!(
        err,
        OrmError::UnknownProperty {
            entity: "Post".to_string(),
            property: "likes".to_string(),
        }
    );
    assert_eq!(handle.execute_count(), 0);
}

#[tokio::test]
async fn test_target_type_mismatch() {
    let (mut manager, handle) = blog();
    let mut post = post(1, Some(2));

    let err = manager
        .resolve::<Post, Tag>(&mut post, PostRelation::Author)
        .await
        .unwrap_err();

    assert!(matches!(err, OrmError::Relation(_)));
    assert_eq!(handle.execute_count(), 0);
    assert_eq!(post.relations.state("author"), RelationState::Unresolved);
}

#[tokio::test]
async fn test_failed_resolution_is_remembered() {
    let (mut manager, handle) = blog();
    let mut post = post(9, Some(1));
    handle.push_result(Err(OrmError::driver("connection reset")));

    let first = manager
        .resolve::<Post, Comment>(&mut post, PostRelation::Comments)
        .await
        .unwrap_err();
    assert_eq!(first, OrmError::driver("connection reset"));
    assert_eq!(post.relations.state("comments"), RelationState::Failed);

    let second = manager
        .resolve::<Post, Comment>(&mut post, PostRelation::Comments)
        .await
        .unwrap_err();
    assert_eq!(second, first);
    assert_eq!(handle.execute_count(), 1);

    // A reset slot loads again
    post.relations.reset("comments");
    handle.push_rows(vec![comment_row(1, 9)]);
    let comments = manager
        .resolve::<Post, Comment>(&mut post, PostRelation::Comments)
        .await
        .unwrap();
    assert_eq!(comments.len(), 1);
}

#[tokio::test]
async fn test_preloaded_relation_skips_query() {
    let (mut manager, handle) = blog();
    let mut post = post(2, Some(1));
    post.relations.preload::<Comment>("comments", Related::Many(Vec::new()));

    let comments = manager
        .resolve::<Post, Comment>(&mut post, PostRelation::Comments)
        .await
        .unwrap();

    assert!(comments.is_empty());
    assert_eq!(handle.execute_count(), 0);
}

#[tokio::test]
async fn test_missing_table_detected_before_any_statement() {
    let driver = RecordingDriver::new().with_table(
        "authors",
        vec![ColumnInfo::new("id", "INTEGER").primary_key()],
    );
    let handle = driver.handle();
    let mut manager = EntityManager::with_driver(driver);

    let err = manager.find::<Post>(QueryDescriptor::new()).await.unwrap_err();

    assert_eq!(
        err,
        OrmError::MissingTable {
            entity: "Post".to_string(),
            table: "posts".to_string(),
        }
    );
    assert_eq!(handle.execute_count(), 0);
    assert_eq!(handle.list_columns_calls(), 0);
}

#[tokio::test]
async fn test_schema_cache_is_shared_between_managers() {
    let cache = SchemaCache::shared();

    let first_driver = blog_driver();
    let first = first_driver.handle();
    let mut manager = EntityManager::with_driver(first_driver).with_schema_cache(Arc::clone(&cache));
    manager.find::<Post>(QueryDescriptor::new()).await.unwrap();
    manager.find::<Post>(QueryDescriptor::new()).await.unwrap();
    assert_eq!(first.list_tables_calls(), 1);

    let second_driver = blog_driver();
    let second = second_driver.handle();
    let mut other = EntityManager::with_driver(second_driver).with_schema_cache(cache);
    other.find::<Post>(QueryDescriptor::new()).await.unwrap();
    assert_eq!(second.list_tables_calls(), 0);
}

#[tokio::test]
async fn test_unconditional_mutations_are_refused() {
    let (mut manager, handle) = blog();

    let err = manager.delete::<Post, _>(json!({})).await.unwrap_err();
    assert!(matches!(err, OrmError::UnconditionalMutation { .. }));

    let fields = elif_entity::field_values(json!({"title": "x"})).unwrap();
    let err = manager.update::<Post, _>(json!({}), fields.clone()).await.unwrap_err();
    assert!(matches!(err, OrmError::UnconditionalMutation { .. }));
    assert_eq!(handle.execute_count(), 0);

    handle.push_affected(4);
    assert_eq!(manager.update_all::<Post>(fields).await.unwrap(), 4);
    assert_eq!(handle.executed_sql(), vec!["UPDATE posts SET title = ?"]);
}

#[tokio::test]
async fn test_delete_removes_dependents_first() {
    let (mut manager, handle) = blog();
    handle.push_rows(vec![Row::new().with("id", 4i64).with("author_id", 1i64).with("title", "Bye")]);
    handle.push_affected(2);
    handle.push_affected(3);
    handle.push_result(Ok(ResultSet::affected(1)));

    let deleted = manager.delete::<Post, _>(json!({"id": 4})).await.unwrap();

    assert_eq!(deleted, 1);
    assert_eq!(
        handle.executed_sql(),
        vec![
            "SELECT * FROM posts WHERE id = ?",
            "DELETE FROM comments WHERE post_id = ?",
            "DELETE FROM post_tag WHERE post_id = ?",
            "DELETE FROM posts WHERE id = ?",
        ]
    );
}

#[tokio::test]
async fn test_find_one_by_condition_map() {
    let (mut manager, handle) = blog();
    handle.push_rows(vec![Row::new().with("id", 2i64).with("name", "Linus")]);

    let author: Option<Author> = manager
        .find_one_by(json!({"name": "Linus", "id >": 1}))
        .await
        .unwrap();

    assert_eq!(author.map(|a| a.id), Some(2));
    assert_eq!(
        handle.executed_sql(),
        vec!["SELECT * FROM authors WHERE name = ? AND id > ? LIMIT 1"]
    );
}

#[tokio::test]
async fn test_empty_list_condition_matches_nothing() {
    let (mut manager, handle) = blog();

    let posts: Vec<Post> = manager.find_by(json!({"id": []})).await.unwrap();

    assert!(posts.is_empty());
    assert_eq!(handle.executed_sql(), vec!["SELECT * FROM posts WHERE 1 = 0"]);
}

#[tokio::test]
async fn test_insert_writes_null_reference_as_literal() {
    let (mut manager, handle) = blog();

    manager.insert(&post(8, None)).await.unwrap();

    let executed = handle.executed();
    assert_eq!(executed[0].sql, "INSERT INTO posts (author_id, id, title) VALUES (NULL, ?, ?)");
    assert_eq!(
        executed[0].values,
        vec![DatabaseValue::Int32(8), DatabaseValue::from("Post 8")]
    );
}
