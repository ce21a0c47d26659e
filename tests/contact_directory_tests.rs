//! Integration tests for the contact directory.

mod common;

use common::{connected_board, seed};
use rstest::rstest;
use serde_json::json;

use taskboard::domain::{ContactDraft, ContactId, ContactPatch};
use taskboard::infrastructure::DocumentStore;
use taskboard::sync::EngineError;

fn draft(first: &str, last: &str, email: &str) -> ContactDraft {
    ContactDraft {
        first_name: first.into(),
        last_name: last.into(),
        email: email.into(),
        phone: "+49 123".into(),
    }
}

#[rstest]
#[tokio::test]
async fn same_email_always_addresses_the_same_contact() {
    let (board, store) = connected_board().await;
    let contacts = board.contacts();

    let first = contacts.save(draft("Anna", "Berg", "Anna.Berg@Example.com")).await.unwrap();
    let second = contacts.save(draft("Anna", "Berg", "anna.berg@example.com")).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(first, ContactId::from_email("anna.berg@example.com"));
    let stored = store.get_all(&board.config().contacts_collection).await.unwrap();
    assert_eq!(stored.len(), 1);
}

#[rstest]
#[tokio::test]
async fn contacts_are_sorted_by_name() {
    let (board, _store) = connected_board().await;
    let contacts = board.contacts();
    contacts.save(draft("zoe", "Young", "zoe@x.com")).await.unwrap();
    contacts.save(draft("Adam", "Smith", "adam@x.com")).await.unwrap();
    contacts.save(draft("Marta", "Lopez", "marta@x.com")).await.unwrap();

    let names: Vec<String> = contacts
        .load_all()
        .await
        .iter()
        .map(|contact| contact.first_name.clone())
        .collect();
    assert_eq!(names, ["Adam", "Marta", "zoe"]);
}

#[rstest]
#[tokio::test]
async fn display_name_only_documents_are_split() {
    let (board, store) = connected_board().await;
    seed(
        &store,
        &board.config().contacts_collection,
        "legacy",
        json!({ "displayName": "Grace Brewster Hopper", "email": "grace@navy.mil" }),
    )
    .await;

    let contact = board.contacts().by_email("grace@navy.mil").await.unwrap();
    assert_eq!(contact.first_name, "Grace");
    assert_eq!(contact.last_name, "Brewster Hopper");
    assert_eq!(contact.initials, "GB");
}

#[rstest]
#[tokio::test]
async fn updating_a_missing_contact_is_not_found() {
    let (board, _store) = connected_board().await;
    let patch = ContactPatch {
        phone: Some("+1 555".into()),
        ..ContactPatch::default()
    };

    let result = board
        .contacts()
        .update(&ContactId::new("nobody_x_com"), &patch)
        .await;

    assert!(matches!(result, Err(EngineError::NotFound { entity: "contact", .. })));
}

#[rstest]
#[tokio::test]
async fn blank_email_is_rejected_before_writing() {
    let (board, store) = connected_board().await;
    let before = store.writes_received();

    let result = board.contacts().save(draft("No", "Mail", "   ")).await;

    assert!(matches!(result, Err(EngineError::ValidationFailed(_))));
    assert_eq!(store.writes_received(), before);
}
