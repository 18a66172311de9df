//! Identity-map, change-tracking and flush semantics.

use crate::connection::{ResultSet, Row};
use crate::entity::AssignValue;
use crate::error::OrmError;
use crate::schema::{EntityDescriptor, Schema};
use crate::store::Store;
use crate::test_support::StubConn;
use crate::value::{Key, Value};

fn blog_schema() -> Schema {
    Schema::new()
        .register(
            EntityDescriptor::new("author", "authors", "id")
                .read(&["id", "name"])
                .write(&["name"]),
        )
        .register(
            EntityDescriptor::new("post", "posts", "id")
                .read(&["id", "title", "author"])
                .write(&["title", "author"])
                .reference_field("author", "author"),
        )
}

fn blog_store() -> Store<StubConn> {
    Store::new(StubConn::new(), blog_schema())
}

fn author_row(id: i64, name: &str) -> Row {
    Row::new().with("id", id).with("name", name)
}

fn post_row(id: i64, title: &str, author: i64) -> Row {
    Row::new()
        .with("id", id)
        .with("title", title)
        .with("author", author)
}

#[test]
fn by_key_returns_the_identical_instance() {
    let store = blog_store();
    store
        .connection()
        .push(ResultSet::new(vec![author_row(7, "ann")]));

    let first = store.by_key("author", 7).unwrap().unwrap();
    let second = store.by_key("author", 7).unwrap().unwrap();
    assert!(first.same(&second));
    // The second call never touched the backend.
    assert_eq!(store.connection().statement_count(), 1);
    assert_eq!(
        store.connection().executed()[0],
        "SELECT `id`, `name` FROM `authors` WHERE `id` = 7 LIMIT 1"
    );
}

#[test]
fn by_key_miss_is_none_not_an_error() {
    let store = blog_store();
    assert!(store.by_key("author", 404).unwrap().is_none());
    assert_eq!(store.connection().statement_count(), 1);
}

#[test]
fn connection_failure_propagates_from_by_key() {
    let store = blog_store();
    store.connection().push_err("server has gone away");
    let err = store.by_key("author", 7).unwrap_err();
    assert!(err.is_connection());
}

#[test]
fn unknown_entity_type_is_rejected() {
    let store = blog_store();
    assert!(matches!(
        store.by_key("ghost", 1),
        Err(OrmError::UnknownEntity(e)) if e == "ghost"
    ));
}

#[test]
fn reference_shared_across_roots_stays_one_instance() {
    let store = blog_store();
    store
        .connection()
        .push(ResultSet::new(vec![post_row(1, "hello", 7)]));
    store
        .connection()
        .push(ResultSet::new(vec![author_row(7, "ann")]));
    store
        .connection()
        .push(ResultSet::new(vec![post_row(2, "again", 7)]));

    let p1 = store.by_key("post", 1).unwrap().unwrap();
    let p2 = store.by_key("post", 2).unwrap().unwrap();
    // Second post's author came from the cache, not a fourth statement.
    assert_eq!(store.connection().statement_count(), 3);

    let a1 = p1.get("author").unwrap().as_entity().cloned().unwrap();
    let a2 = p2.get("author").unwrap().as_entity().cloned().unwrap();
    assert!(a1.same(&a2));

    // Renaming through one root is visible through the other.
    store.set(&a1, "name", "gwen").unwrap();
    let seen = p2.get("author").unwrap();
    let seen = seen.as_entity().unwrap().get("name").unwrap();
    assert_eq!(seen.as_text(), Some("gwen"));
}

#[test]
fn save_without_changes_executes_nothing() {
    let store = blog_store();
    store
        .connection()
        .push(ResultSet::new(vec![author_row(7, "ann")]));
    let author = store.by_key("author", 7).unwrap().unwrap();

    store.save(&author).unwrap();
    assert_eq!(store.connection().statement_count(), 1);
}

#[test]
fn save_flushes_exactly_the_touched_fields() {
    let store = blog_store();
    store
        .connection()
        .push(ResultSet::new(vec![author_row(7, "ann")]));
    let author = store.by_key("author", 7).unwrap().unwrap();

    store.set(&author, "name", "gwen").unwrap();
    assert!(author.is_dirty());
    store.save(&author).unwrap();

    let executed = store.connection().executed();
    assert_eq!(
        executed.last().unwrap(),
        "UPDATE `authors` SET `name` = 'gwen' WHERE `id` = 7"
    );
    assert!(!author.is_dirty());

    // Flushed once; a second save is a no-op.
    store.save(&author).unwrap();
    assert_eq!(store.connection().statement_count(), 2);
}

#[test]
fn release_then_reload_issues_a_fresh_select() {
    let store = blog_store();
    store
        .connection()
        .push(ResultSet::new(vec![author_row(7, "ann")]));
    let before = store.by_key("author", 7).unwrap().unwrap();

    assert!(store.release("author", 7).unwrap());
    store
        .connection()
        .push(ResultSet::new(vec![author_row(7, "ann")]));
    let after = store.by_key("author", 7).unwrap().unwrap();

    assert_eq!(store.connection().statement_count(), 2);
    assert!(!before.same(&after));
}

#[test]
fn release_reports_whether_an_entry_existed() {
    let store = blog_store();
    assert!(!store.release("author", 7).unwrap());
}

#[test]
fn release_all_drops_one_type() {
    let store = blog_store();
    store
        .connection()
        .push(ResultSet::new(vec![author_row(7, "ann")]));
    let before = store.by_key("author", 7).unwrap().unwrap();

    store.release_all("author").unwrap();
    store
        .connection()
        .push(ResultSet::new(vec![author_row(7, "ann")]));
    let after = store.by_key("author", 7).unwrap().unwrap();
    assert!(!before.same(&after));
}

#[test]
fn get_honors_descriptor_policy() {
    let schema = Schema::new().register(
        EntityDescriptor::new("author", "authors", "id")
            .read(&["id", "name", "email"])
            .write(&["name"]),
    );
    let store = Store::new(StubConn::new(), schema);
    // The row carries no email column even though the descriptor allows it.
    store
        .connection()
        .push(ResultSet::new(vec![author_row(7, "ann")]));
    let author = store.by_key("author", 7).unwrap().unwrap();

    assert!(matches!(
        author.get("secret"),
        Err(OrmError::FieldNotReadable { .. })
    ));
    assert!(matches!(
        author.get("email"),
        Err(OrmError::UnknownField(f)) if f == "email"
    ));
}

#[test]
fn set_rejects_unwritable_fields() {
    let store = blog_store();
    store
        .connection()
        .push(ResultSet::new(vec![author_row(7, "ann")]));
    let author = store.by_key("author", 7).unwrap().unwrap();

    assert!(matches!(
        store.set(&author, "id", 8i64),
        Err(OrmError::FieldNotWritable { .. })
    ));
    assert!(!author.is_dirty());
}

#[test]
fn set_reference_with_raw_key_resolves_it() {
    let store = blog_store();
    store
        .connection()
        .push(ResultSet::new(vec![post_row(1, "hello", 7)]));
    store
        .connection()
        .push(ResultSet::new(vec![author_row(7, "ann")]));
    let post = store.by_key("post", 1).unwrap().unwrap();

    store
        .connection()
        .push(ResultSet::new(vec![author_row(8, "bob")]));
    store.set(&post, "author", 8i64).unwrap();

    let author = post.get("author").unwrap();
    assert_eq!(author.as_entity().unwrap().key(), Key::Int(8));

    store.save(&post).unwrap();
    assert_eq!(
        store.connection().executed().last().unwrap(),
        "UPDATE `posts` SET `author` = 8 WHERE `id` = 1"
    );
}

#[test]
fn set_reference_with_dangling_key_fails() {
    let store = blog_store();
    store
        .connection()
        .push(ResultSet::new(vec![post_row(1, "hello", 7)]));
    store
        .connection()
        .push(ResultSet::new(vec![author_row(7, "ann")]));
    let post = store.by_key("post", 1).unwrap().unwrap();

    // No row for author 404.
    let err = store.set(&post, "author", 404i64).unwrap_err();
    assert!(err.is_row_not_found());
}

#[test]
fn set_reference_with_wrong_entity_type_fails() {
    let store = blog_store();
    store
        .connection()
        .push(ResultSet::new(vec![post_row(1, "hello", 7)]));
    store
        .connection()
        .push(ResultSet::new(vec![author_row(7, "ann")]));
    store
        .connection()
        .push(ResultSet::new(vec![post_row(2, "again", 7)]));
    let post = store.by_key("post", 1).unwrap().unwrap();
    let other = store.by_key("post", 2).unwrap().unwrap();

    assert!(matches!(
        store.set(&post, "author", &other),
        Err(OrmError::TypeMismatch { .. })
    ));
}

#[test]
fn set_entity_on_scalar_field_fails() {
    let store = blog_store();
    store
        .connection()
        .push(ResultSet::new(vec![post_row(1, "hello", 7)]));
    store
        .connection()
        .push(ResultSet::new(vec![author_row(7, "ann")]));
    let post = store.by_key("post", 1).unwrap().unwrap();
    let author = post.get("author").unwrap().as_entity().cloned().unwrap();

    assert!(matches!(
        store.set(&post, "title", &author),
        Err(OrmError::TypeMismatch { .. })
    ));
}

#[test]
fn set_accepts_an_already_resolved_entity() {
    let store = blog_store();
    store
        .connection()
        .push(ResultSet::new(vec![post_row(1, "hello", 7)]));
    store
        .connection()
        .push(ResultSet::new(vec![author_row(7, "ann")]));
    store
        .connection()
        .push(ResultSet::new(vec![author_row(8, "bob")]));
    let post = store.by_key("post", 1).unwrap().unwrap();
    let bob = store.by_key("author", 8).unwrap().unwrap();

    store.set(&post, "author", &bob).unwrap();
    let seen = post.get("author").unwrap();
    assert!(seen.as_entity().unwrap().same(&bob));
}

#[test]
fn insert_row_reloads_through_the_generated_key() {
    let store = blog_store();
    store
        .connection()
        .push(ResultSet::new(Vec::new()).with_affected(1).with_last_insert_id(9i64));
    store
        .connection()
        .push(ResultSet::new(vec![author_row(9, "carol")]));

    let carol = store
        .insert_row("author", vec![("name", AssignValue::from("carol"))])
        .unwrap();
    assert_eq!(carol.key(), Key::Int(9));
    assert_eq!(
        store.connection().executed()[0],
        "INSERT INTO `authors` (`name`) VALUES ('carol')"
    );

    // The reloaded row is cached: no further statements.
    let again = store.by_key("author", 9).unwrap().unwrap();
    assert!(carol.same(&again));
    assert_eq!(store.connection().statement_count(), 2);
}

#[test]
fn insert_row_falls_back_to_the_supplied_key() {
    let store = blog_store();
    store.connection().push(ResultSet::new(Vec::new()).with_affected(1));
    store
        .connection()
        .push(ResultSet::new(vec![author_row(5, "dora")]));

    let dora = store
        .insert_row(
            "author",
            vec![
                ("id", AssignValue::from(5i64)),
                ("name", AssignValue::from("dora")),
            ],
        )
        .unwrap();
    assert_eq!(dora.key(), Key::Int(5));
}

#[test]
fn insert_row_collapses_entity_values_to_their_key() {
    let store = blog_store();
    store
        .connection()
        .push(ResultSet::new(vec![author_row(7, "ann")]));
    let ann = store.by_key("author", 7).unwrap().unwrap();

    store
        .connection()
        .push(ResultSet::new(Vec::new()).with_affected(1).with_last_insert_id(3i64));
    store
        .connection()
        .push(ResultSet::new(vec![post_row(3, "fresh", 7)]));

    let post = store
        .insert_row(
            "post",
            vec![
                ("title", AssignValue::from("fresh")),
                ("author", AssignValue::from(&ann)),
            ],
        )
        .unwrap();
    assert_eq!(
        store.connection().executed()[1],
        "INSERT INTO `posts` (`title`, `author`) VALUES ('fresh', 7)"
    );
    // The reload resolved the reference back to the cached author.
    let seen = post.get("author").unwrap();
    assert!(seen.as_entity().unwrap().same(&ann));
}

#[test]
fn checkout_commit_flushes_once() {
    let store = blog_store();
    store
        .connection()
        .push(ResultSet::new(vec![author_row(7, "ann")]));

    let guard = store.checkout("author", 7).unwrap().unwrap();
    guard.set("name", "gwen").unwrap();
    guard.commit().unwrap();

    assert_eq!(
        store.connection().executed().last().unwrap(),
        "UPDATE `authors` SET `name` = 'gwen' WHERE `id` = 7"
    );
}

#[test]
fn checkout_drop_flushes_as_a_safety_net() {
    let store = blog_store();
    store
        .connection()
        .push(ResultSet::new(vec![author_row(7, "ann")]));

    {
        let guard = store.checkout("author", 7).unwrap().unwrap();
        guard.set("name", "gwen").unwrap();
        // Dropped without commit.
    }
    assert_eq!(
        store.connection().executed().last().unwrap(),
        "UPDATE `authors` SET `name` = 'gwen' WHERE `id` = 7"
    );
}

#[test]
fn checkout_drop_without_changes_is_silent() {
    let store = blog_store();
    store
        .connection()
        .push(ResultSet::new(vec![author_row(7, "ann")]));
    {
        let _guard = store.checkout("author", 7).unwrap().unwrap();
    }
    assert_eq!(store.connection().statement_count(), 1);
}

#[test]
fn bulk_update_bypasses_the_cache() {
    let store = blog_store();
    store
        .connection()
        .push(ResultSet::new(vec![author_row(7, "ann")]));
    let cached = store.by_key("author", 7).unwrap().unwrap();

    let bulk = store
        .bulk_update("author", [("name", "renamed")])
        .unwrap()
        .gt("id", 0i64);
    store.connection().push(ResultSet::new(Vec::new()).with_affected(2));
    bulk.execute(store.connection()).unwrap();
    assert_eq!(
        store.connection().executed().last().unwrap(),
        "UPDATE `authors` SET `name` = 'renamed' WHERE `id` > 0"
    );

    // Stale until released: the cached instance still holds the old value.
    let name = cached.get("name").unwrap();
    assert_eq!(name.as_text(), Some("ann"));

    store.release("author", 7).unwrap();
    store
        .connection()
        .push(ResultSet::new(vec![author_row(7, "renamed")]));
    let fresh = store.by_key("author", 7).unwrap().unwrap();
    assert_eq!(fresh.get("name").unwrap().as_text(), Some("renamed"));
}

#[test]
fn bulk_delete_is_pre_scoped_to_the_table() {
    let store = blog_store();
    let sql = store
        .bulk_delete("post")
        .unwrap()
        .lt("id", 100i64)
        .render(store.connection())
        .unwrap();
    assert_eq!(sql, "DELETE FROM `posts` WHERE `id` < 100");
}

#[test]
fn find_applies_row_count_semantics() {
    let store = blog_store();

    store.connection().push(ResultSet::new(Vec::new()));
    let q = store.query("author").unwrap();
    assert!(store.find("author", 1, q).unwrap().is_none());

    store.connection().push(ResultSet::new(vec![
        author_row(1, "a"),
        author_row(2, "b"),
    ]));
    let q = store.query("author").unwrap();
    let err = store.find("author", 3, q).unwrap_err();
    assert!(err.is_insufficient_rows());
}

#[test]
fn find_materializes_through_the_cache() {
    let store = blog_store();
    store
        .connection()
        .push(ResultSet::new(vec![author_row(7, "ann")]));
    let cached = store.by_key("author", 7).unwrap().unwrap();

    // The fetched row disagrees with the cache; the cached instance wins.
    store
        .connection()
        .push(ResultSet::new(vec![author_row(7, "imposter")]));
    let q = store.query("author").unwrap();
    let found = store.find("author", 1, q).unwrap().unwrap();
    assert!(found[0].same(&cached));
    assert_eq!(found[0].get("name").unwrap().as_text(), Some("ann"));
}

#[test]
fn ref_eq_compares_by_entity_key() {
    let store = blog_store();
    store
        .connection()
        .push(ResultSet::new(vec![author_row(7, "ann")]));
    let ann = store.by_key("author", 7).unwrap().unwrap();

    let sql = store
        .query("post")
        .unwrap()
        .filter("author", crate::query::Cmp::RefEq, &ann)
        .render(store.connection())
        .unwrap();
    assert_eq!(
        sql,
        "SELECT `author`, `id`, `title` FROM `posts` WHERE `author` = 7"
    );
}

#[test]
fn null_foreign_key_stays_a_null_scalar() {
    let store = blog_store();
    store.connection().push(ResultSet::new(vec![
        Row::new()
            .with("id", 4i64)
            .with("title", "orphan")
            .with("author", Value::Null),
    ]));

    let post = store.by_key("post", 4).unwrap().unwrap();
    let author = post.get("author").unwrap();
    assert_eq!(author.as_value(), Some(&Value::Null));
    // No reference resolution happened.
    assert_eq!(store.connection().statement_count(), 1);
}

#[test]
fn dangling_foreign_key_is_an_error() {
    let store = blog_store();
    store
        .connection()
        .push(ResultSet::new(vec![post_row(1, "hello", 404)]));
    // Author 404 resolves to an empty result.
    let err = store.by_key("post", 1).unwrap_err();
    assert!(err.is_row_not_found());
}

#[test]
fn failed_reference_resolution_evicts_the_half_built_entry() {
    let store = blog_store();
    store
        .connection()
        .push(ResultSet::new(vec![post_row(1, "hello", 404)]));
    assert!(store.by_key("post", 1).unwrap_err().is_row_not_found());

    // The failed load left nothing cached: the retry issues a fresh SELECT
    // and comes back fully resolved once the row is repaired.
    store
        .connection()
        .push(ResultSet::new(vec![post_row(1, "hello", 7)]));
    store
        .connection()
        .push(ResultSet::new(vec![author_row(7, "ann")]));
    let post = store.by_key("post", 1).unwrap().unwrap();
    let author = post.get("author").unwrap();
    assert_eq!(author.as_entity().unwrap().key(), Key::Int(7));
    assert_eq!(store.connection().statement_count(), 4);
}

#[test]
fn connection_failure_during_resolution_evicts_the_half_built_entry() {
    let store = blog_store();
    store
        .connection()
        .push(ResultSet::new(vec![post_row(1, "hello", 7)]));
    store.connection().push_err("server has gone away");
    assert!(store.by_key("post", 1).unwrap_err().is_connection());

    // Once the backend heals, the retry loads the row instead of hitting a
    // half-built cache entry.
    store
        .connection()
        .push(ResultSet::new(vec![post_row(1, "hello", 7)]));
    store
        .connection()
        .push(ResultSet::new(vec![author_row(7, "ann")]));
    let post = store.by_key("post", 1).unwrap().unwrap();
    assert!(post.get("author").unwrap().as_entity().is_some());
    assert_eq!(store.connection().statement_count(), 4);
}

#[test]
fn cyclic_references_terminate() {
    let schema = Schema::new().register(
        EntityDescriptor::new("node", "nodes", "id")
            .read(&["id", "next"])
            .write(&["next"])
            .reference_field("next", "node"),
    );
    let store = Store::new(StubConn::new(), schema);
    store
        .connection()
        .push(ResultSet::new(vec![Row::new().with("id", 1i64).with("next", 1i64)]));

    let node = store.by_key("node", 1).unwrap().unwrap();
    let next = node.get("next").unwrap();
    assert!(next.as_entity().unwrap().same(&node));
    assert_eq!(store.connection().statement_count(), 1);
}
