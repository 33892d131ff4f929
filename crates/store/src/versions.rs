//! Draft versions
//!
//! Records belong to one draft version. Forking continues editing in a new
//! version row that starts with a copy of the current content and records;
//! switching loads another version and makes its records the working set.

use crate::{Backend, DraftId, DraftVersion, EditingSession, Result, VersionSummary};

impl<B: Backend> EditingSession<B> {
    /// Persist the current state and continue in a new version
    pub async fn fork_version(&mut self) -> Result<DraftVersion> {
        let summary = self.flush().await?;
        if let Some(error) = summary.error_message() {
            tracing::warn!(draft = %self.draft_id, %error, "forking from a partially synced draft");
        }

        let fork = self.backend.fork_draft(self.draft_id, self.requester_id()).await?;
        tracing::info!(
            from = %self.draft_id,
            to = %fork.draft_id,
            version = fork.version_number,
            "forked draft version"
        );
        self.draft_id = fork.draft_id;
        let revision = self.engine().revision();
        self.state.write().await.reset_persisted(fork.draft_id, revision);
        self.publish();
        Ok(fork)
    }

    /// Persist the current state and load another version
    pub async fn switch_version(&mut self, draft_id: DraftId) -> Result<DraftVersion> {
        self.flush().await?;

        let version = self.backend.load_draft(draft_id).await?;
        let doc = version.document()?;
        let loaded = self.load_version(&version, doc)?;
        self.state.write().await.reset_persisted(draft_id, loaded);
        self.publish();
        tracing::info!(draft = %draft_id, version = version.version_number, "switched draft version");
        Ok(version)
    }

    /// Every version of the current draft's document, oldest first
    pub async fn versions(&self) -> Result<Vec<VersionSummary>> {
        Ok(self.backend.list_versions(self.draft_id).await?)
    }
}

#[cfg(test)]
mod tests {
    use crate::{EditingSession, InMemoryBackend, SessionConfig};
    use doc_model::Selection;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_fork_then_switch_back() {
        let backend = Arc::new(InMemoryBackend::new());
        let first = backend.create_draft("alice");
        let mut session = EditingSession::open(backend.clone(), first, "alice", SessionConfig::default())
            .await
            .unwrap();
        session.insert_text("first draft").unwrap();

        let fork = session.fork_version().await.unwrap();
        assert_eq!(fork.version_number, 2);
        assert_eq!(session.draft_id(), fork.draft_id);

        session.set_selection(Selection::caret(session.doc().content_size() - 1));
        session.insert_text(", revised").unwrap();
        session.flush().await.unwrap();
        assert_eq!(backend.draft(fork.draft_id).unwrap().plain_text, "first draft, revised");
        assert_eq!(backend.draft(first).unwrap().plain_text, "first draft");

        let loaded = session.switch_version(first).await.unwrap();
        assert_eq!(loaded.version_number, 1);
        assert_eq!(session.doc().plain_text(), "first draft");
        assert!(!session.status().await.dirty);

        let versions = session.versions().await.unwrap();
        assert_eq!(versions.len(), 2);
    }
}
