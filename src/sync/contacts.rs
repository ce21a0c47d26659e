//! Contact directory.
//!
//! Contacts live in their own collection and feed the board's assignee
//! pickers. The directory keeps a live, name-ordered snapshot and writes
//! through to the store; none of its writes are optimistic.

use std::sync::Arc;

use futures::future::BoxFuture;

use super::error::EngineError;
use super::listener::{CollectionListener, contact_name_order};
use super::normalize::{contact_patch_to_document, contact_to_document, normalize_contact};
use super::snapshot::{SnapshotStore, SnapshotStream};
use crate::domain::{Contact, ContactDraft, ContactId, ContactPatch, canonical_email};
use crate::infrastructure::{
    CollectionName, Document, DocumentId, DocumentStore, StoreError, server_timestamp,
};

/// Live view of the contact collection plus its write operations.
///
/// Cloning is cheap; clones share the snapshot and the listener.
#[derive(Clone)]
pub struct ContactDirectory {
    store: Arc<dyn DocumentStore>,
    collection: CollectionName,
    contacts: SnapshotStore<Contact>,
    listener: Arc<CollectionListener>,
}

impl std::fmt::Debug for ContactDirectory {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("ContactDirectory")
            .field("collection", &self.collection)
            .field("listener", &self.listener.state())
            .finish_non_exhaustive()
    }
}

fn document_id(contact_id: &ContactId) -> DocumentId {
    DocumentId::new(contact_id.as_str())
}

fn sorted(mut contacts: Vec<Contact>) -> Vec<Contact> {
    contacts.sort_by(contact_name_order);
    contacts
}

impl ContactDirectory {
    /// Starts following `collection`.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    pub fn connect(store: Arc<dyn DocumentStore>, collection: CollectionName) -> Self {
        let contacts = SnapshotStore::new();
        let listener = CollectionListener::spawn(
            Arc::clone(&store),
            collection.clone(),
            contacts.clone(),
            normalize_contact,
            contact_name_order,
        );
        Self {
            store,
            collection,
            contacts,
            listener: Arc::new(listener),
        }
    }

    /// Returns the listener feeding the snapshot.
    #[must_use]
    pub fn listener(&self) -> &CollectionListener {
        &self.listener
    }

    /// Returns the latest contact snapshot.
    #[must_use]
    pub fn current(&self) -> Arc<[Contact]> {
        self.contacts.current()
    }

    /// Observes the contact snapshot.
    #[must_use]
    pub fn observe(&self) -> SnapshotStream<Contact> {
        self.contacts.observe()
    }

    /// Returns the contact with the given id from the snapshot.
    #[must_use]
    pub fn get(&self, contact_id: &ContactId) -> Option<Contact> {
        self.contacts
            .current()
            .iter()
            .find(|contact| &contact.id == contact_id)
            .cloned()
    }

    /// Fetches every contact once, bypassing the snapshot.
    ///
    /// A failed fetch is logged and yields an empty list.
    pub async fn load_all(&self) -> Vec<Contact> {
        match self.store.get_all(&self.collection).await {
            Ok(documents) => sorted(documents.iter().map(normalize_contact).collect()),
            Err(error) => {
                tracing::warn!(collection = %self.collection, %error, "Failed to load contacts");
                Vec::new()
            }
        }
    }

    /// Finds a contact by email address, ignoring case and surrounding
    /// whitespace.
    pub async fn by_email(&self, email: &str) -> Option<Contact> {
        let wanted = canonical_email(email);
        self.load_all()
            .await
            .into_iter()
            .find(|contact| canonical_email(&contact.email) == wanted)
    }

    /// Saves a contact, deriving its id, colour and initials.
    ///
    /// Saving the same email again overwrites the same record.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::ValidationFailed`] for a blank email, or
    /// [`EngineError::RemoteWriteFailed`] if the store rejects the write.
    pub async fn save(&self, draft: ContactDraft) -> Result<ContactId, EngineError> {
        if draft.email.trim().is_empty() {
            return Err(EngineError::ValidationFailed(
                "contact email must not be empty".to_string(),
            ));
        }
        let contact = draft.into_contact();
        let mut document = contact_to_document(&contact);
        document.insert("createdAt".into(), server_timestamp());
        document.insert("updatedAt".into(), server_timestamp());

        Self::write(
            &contact.id,
            self.store
                .set(&self.collection, &document_id(&contact.id), document),
        )
        .await?;
        tracing::info!(contact_id = %contact.id, "Contact saved");
        Ok(contact.id)
    }

    /// Merges changed fields into a stored contact.
    ///
    /// Changing either name also rewrites `displayName` and `initials`.
    /// An empty patch writes nothing.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::NotFound`] if the contact does not exist, or
    /// [`EngineError::RemoteWriteFailed`] if the store rejects the write.
    pub async fn update(
        &self,
        contact_id: &ContactId,
        patch: &ContactPatch,
    ) -> Result<(), EngineError> {
        if patch.is_empty() {
            return Ok(());
        }
        let current = self.get(contact_id);
        let mut document: Document = contact_patch_to_document(patch, current.as_ref());
        document.insert("updatedAt".into(), server_timestamp());

        Self::write(
            contact_id,
            self.store
                .update(&self.collection, &document_id(contact_id), document),
        )
        .await
    }

    /// Deletes a contact.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::RemoteWriteFailed`] if the store rejects the
    /// delete.
    pub async fn delete(&self, contact_id: &ContactId) -> Result<(), EngineError> {
        Self::write(
            contact_id,
            self.store.delete(&self.collection, &document_id(contact_id)),
        )
        .await?;
        tracing::info!(contact_id = %contact_id, "Contact deleted");
        Ok(())
    }

    async fn write(
        contact_id: &ContactId,
        write: BoxFuture<'static, Result<(), StoreError>>,
    ) -> Result<(), EngineError> {
        write.await.map_err(|error| {
            tracing::warn!(contact_id = %contact_id, %error, "Contact write failed");
            EngineError::from_write("contact", contact_id, error)
        })
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::avatar_color;
    use crate::infrastructure::InMemoryDocumentStore;
    use rstest::rstest;
    use serde_json::json;

    fn users() -> CollectionName {
        CollectionName::new("users")
    }

    fn draft(first: &str, last: &str, email: &str) -> ContactDraft {
        ContactDraft {
            first_name: first.to_string(),
            last_name: last.to_string(),
            email: email.to_string(),
            phone: String::new(),
        }
    }

    async fn directory() -> (InMemoryDocumentStore, ContactDirectory) {
        let store = InMemoryDocumentStore::new();
        let directory = ContactDirectory::connect(Arc::new(store.clone()), users());
        directory.listener().wait_live().await.unwrap();
        (store, directory)
    }

    #[rstest]
    #[tokio::test]
    async fn test_save_twice_addresses_same_record() {
        let (store, directory) = directory().await;
        let first = directory.save(draft("A", "B", "a.b@x.com")).await.unwrap();
        let second = directory.save(draft("A", "B", "a.b@x.com")).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first.as_str(), "a_b_x_com");
        assert_eq!(store.get_all(&users()).await.unwrap().len(), 1);
    }

    #[rstest]
    #[tokio::test]
    async fn test_saved_contact_has_derived_fields() {
        let (_store, directory) = directory().await;
        directory
            .save(draft("Anna", "Schmidt", "anna@x.com"))
            .await
            .unwrap();
        let contact = directory.by_email("anna@x.com").await.unwrap();
        assert_eq!(contact.initials, "AS");
        assert_eq!(contact.color, avatar_color("anna@x.com"));
    }

    #[rstest]
    #[case("Anna@X.com")]
    #[case("  anna@x.com ")]
    #[case("ANNA@X.COM")]
    #[tokio::test]
    async fn test_by_email_ignores_case_and_whitespace(#[case] query: &str) {
        let (_store, directory) = directory().await;
        directory
            .save(draft("Anna", "Schmidt", "Anna@x.com"))
            .await
            .unwrap();
        let contact = directory.by_email(query).await.unwrap();
        assert_eq!(contact.id.as_str(), "anna_x_com");
        assert_eq!(contact.color, avatar_color("anna@x.com"));
    }

    #[rstest]
    #[tokio::test]
    async fn test_blank_email_is_rejected() {
        let (store, directory) = directory().await;
        let result = directory.save(draft("No", "Mail", "  ")).await;
        assert!(matches!(result, Err(EngineError::ValidationFailed(_))));
        assert_eq!(store.writes_received(), 0);
    }

    #[rstest]
    #[tokio::test]
    async fn test_load_all_sorts_by_name() {
        let (_store, directory) = directory().await;
        directory.save(draft("zoe", "Z", "z@x.com")).await.unwrap();
        directory.save(draft("Adam", "A", "a@x.com")).await.unwrap();
        let names: Vec<String> = directory
            .load_all()
            .await
            .iter()
            .map(Contact::full_name)
            .collect();
        assert_eq!(names, vec!["Adam A", "zoe Z"]);
    }

    #[rstest]
    #[tokio::test]
    async fn test_update_rewrites_display_name() {
        let (store, directory) = directory().await;
        let mut observer = directory.observe();
        let id = directory
            .save(draft("Anna", "Schmidt", "anna@x.com"))
            .await
            .unwrap();
        while observer.next().await.unwrap().is_empty() {}

        let patch = ContactPatch {
            last_name: Some("Meyer".to_string()),
            ..ContactPatch::default()
        };
        directory.update(&id, &patch).await.unwrap();
        let stored = store.get_all(&users()).await.unwrap();
        assert_eq!(stored[0].data["displayName"], json!("Anna Meyer"));
        assert_eq!(stored[0].data["firstName"], json!("Anna"));
    }

    #[rstest]
    #[tokio::test]
    async fn test_update_missing_contact_is_not_found() {
        let (_store, directory) = directory().await;
        let patch = ContactPatch {
            phone: Some("123".to_string()),
            ..ContactPatch::default()
        };
        assert_eq!(
            directory.update(&ContactId::new("nobody"), &patch).await,
            Err(EngineError::not_found("contact", "nobody"))
        );
    }

    struct UnreachableStore;

    impl DocumentStore for UnreachableStore {
        fn get_all(
            &self,
            _: &CollectionName,
        ) -> BoxFuture<'static, Result<Vec<crate::infrastructure::StoredDocument>, StoreError>>
        {
            Box::pin(async { Err(StoreError::Unavailable("offline".to_string())) })
        }

        fn subscribe(
            &self,
            _: &CollectionName,
        ) -> BoxFuture<'static, Result<crate::infrastructure::CollectionSubscription, StoreError>>
        {
            Box::pin(async { Err(StoreError::Unavailable("offline".to_string())) })
        }

        fn set(
            &self,
            _: &CollectionName,
            _: &DocumentId,
            _: Document,
        ) -> BoxFuture<'static, Result<(), StoreError>> {
            Box::pin(async { Err(StoreError::Unavailable("offline".to_string())) })
        }

        fn update(
            &self,
            _: &CollectionName,
            _: &DocumentId,
            _: Document,
        ) -> BoxFuture<'static, Result<(), StoreError>> {
            Box::pin(async { Err(StoreError::Unavailable("offline".to_string())) })
        }

        fn delete(
            &self,
            _: &CollectionName,
            _: &DocumentId,
        ) -> BoxFuture<'static, Result<(), StoreError>> {
            Box::pin(async { Err(StoreError::Unavailable("offline".to_string())) })
        }
    }

    #[rstest]
    #[tokio::test]
    async fn test_unreachable_store_degrades_to_empty() {
        let directory = ContactDirectory::connect(Arc::new(UnreachableStore), users());
        assert_eq!(
            directory.listener().wait_live().await,
            Err(EngineError::SubscriptionFailed(StoreError::Unavailable(
                "offline".to_string()
            )))
        );
        assert!(directory.current().is_empty());
        assert!(directory.load_all().await.is_empty());
        assert!(directory.by_email("a@x.com").await.is_none());
        assert!(matches!(
            directory.save(draft("A", "B", "a@x.com")).await,
            Err(EngineError::RemoteWriteFailed(_))
        ));
    }

    #[rstest]
    #[tokio::test]
    async fn test_delete_removes_contact() {
        let (store, directory) = directory().await;
        let id = directory.save(draft("A", "B", "a@x.com")).await.unwrap();
        directory.delete(&id).await.unwrap();
        assert!(store.get_all(&users()).await.unwrap().is_empty());
        assert!(directory.by_email("a@x.com").await.is_none());
    }
}
