//! Threaded comments per collaboration scope.
//!
//! Comments append in arrival order and never reorder, so a scope's list
//! reads as a stable audit trail. Replies nest inside their parent comment;
//! lookups, patches, and deletes address top-level comments, which means
//! removing a comment removes its thread with it.
//!
//! Mutations hand back a clone of the updated comment so the facade can put
//! the fresh snapshot into an event without a second lookup.

use std::collections::HashMap;

use log::debug;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::event::epoch_millis;
use crate::session::CollaborationUser;

/// A comment as stored: server-assigned id, stamps, and thread state.
///
/// `author` is a snapshot taken at creation, not a live reference, so
/// rendered history stays stable even if the profile later changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollaborationComment {
    pub id: String,
    /// Scope the comment belongs to (the use-case id).
    pub scope: String,
    /// Form field the comment is anchored to, if any.
    pub field: Option<String>,
    pub content: String,
    pub author: CollaborationUser,
    pub created_at: u64,
    pub updated_at: u64,
    pub resolved: bool,
    pub mentions: Vec<String>,
    pub replies: Vec<CollaborationComment>,
    /// Reaction label to the ids of users who reacted with it.
    pub reactions: HashMap<String, Vec<String>>,
}

impl CollaborationComment {
    /// Promote a draft to a stored comment: fresh id, stamps, empty thread.
    pub fn new(scope: impl Into<String>, draft: CommentDraft) -> Self {
        let now = epoch_millis();
        Self {
            id: Uuid::new_v4().to_string(),
            scope: scope.into(),
            field: draft.field,
            content: draft.content,
            author: draft.author,
            created_at: now,
            updated_at: now,
            resolved: false,
            mentions: draft.mentions,
            replies: Vec::new(),
            reactions: HashMap::new(),
        }
    }
}

/// Author-supplied part of a new comment.
#[derive(Debug, Clone)]
pub struct CommentDraft {
    pub author: CollaborationUser,
    pub content: String,
    pub field: Option<String>,
    pub mentions: Vec<String>,
}

impl CommentDraft {
    pub fn new(author: CollaborationUser, content: impl Into<String>) -> Self {
        Self {
            author,
            content: content.into(),
            field: None,
            mentions: Vec::new(),
        }
    }

    /// Anchor the comment to a form field.
    pub fn in_field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }

    /// Mention another user.
    pub fn mentioning(mut self, user_id: impl Into<String>) -> Self {
        self.mentions.push(user_id.into());
        self
    }
}

/// Field-wise patch for `CommentStore::update`.
///
/// `None` leaves a field alone; `Some` replaces it wholesale. Replies are
/// patched as a full list, which is also how a thread gains its first reply.
#[derive(Debug, Clone, Default)]
pub struct CommentPatch {
    pub content: Option<String>,
    pub field: Option<String>,
    pub resolved: Option<bool>,
    pub mentions: Option<Vec<String>>,
    pub replies: Option<Vec<CollaborationComment>>,
}

/// Scope-keyed comment lists.
#[derive(Debug, Default)]
pub struct CommentStore {
    comments: HashMap<String, Vec<CollaborationComment>>,
}

impl CommentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a new comment and return the stored form.
    pub fn add(&mut self, scope: &str, draft: CommentDraft) -> CollaborationComment {
        let comment = CollaborationComment::new(scope, draft);
        debug!("comment {} added to scope {}", comment.id, scope);
        self.comments
            .entry(scope.to_string())
            .or_default()
            .push(comment.clone());
        comment
    }

    /// All comments for the scope in creation order, resolved ones included.
    pub fn list(&self, scope: &str) -> &[CollaborationComment] {
        self.comments.get(scope).map(Vec::as_slice).unwrap_or_default()
    }

    /// Merge a patch into a top-level comment and refresh `updated_at`.
    ///
    /// `None` when the scope or comment id is unknown.
    pub fn update(
        &mut self,
        scope: &str,
        comment_id: &str,
        patch: CommentPatch,
    ) -> Option<CollaborationComment> {
        let comment = self.find_mut(scope, comment_id)?;

        if let Some(content) = patch.content {
            comment.content = content;
        }
        if let Some(field) = patch.field {
            comment.field = Some(field);
        }
        if let Some(resolved) = patch.resolved {
            comment.resolved = resolved;
        }
        if let Some(mentions) = patch.mentions {
            comment.mentions = mentions;
        }
        if let Some(replies) = patch.replies {
            comment.replies = replies;
        }
        comment.updated_at = epoch_millis();
        Some(comment.clone())
    }

    /// Remove a top-level comment and its thread. Returns whether it existed.
    pub fn delete(&mut self, scope: &str, comment_id: &str) -> bool {
        let list = match self.comments.get_mut(scope) {
            Some(list) => list,
            None => return false,
        };
        let before = list.len();
        list.retain(|c| c.id != comment_id);
        let removed = list.len() < before;
        if list.is_empty() {
            self.comments.remove(scope);
        }
        removed
    }

    /// Record a reaction from a user.
    ///
    /// The reaction bucket is created on first use and a user counts at most
    /// once per label, so repeated clicks are harmless.
    pub fn add_reaction(
        &mut self,
        scope: &str,
        comment_id: &str,
        user_id: &str,
        reaction: &str,
    ) -> Option<CollaborationComment> {
        let comment = self.find_mut(scope, comment_id)?;
        let reactors = comment.reactions.entry(reaction.to_string()).or_default();
        if !reactors.iter().any(|id| id == user_id) {
            reactors.push(user_id.to_string());
        }
        Some(comment.clone())
    }

    fn find_mut(&mut self, scope: &str, comment_id: &str) -> Option<&mut CollaborationComment> {
        self.comments
            .get_mut(scope)?
            .iter_mut()
            .find(|c| c.id == comment_id)
    }

    /// Top-level comment count for one scope.
    pub fn count(&self, scope: &str) -> usize {
        self.comments.get(scope).map(Vec::len).unwrap_or(0)
    }

    /// Unresolved top-level comments for one scope.
    pub fn unresolved_count(&self, scope: &str) -> usize {
        self.list(scope).iter().filter(|c| !c.resolved).count()
    }

    /// Top-level comments across all scopes.
    pub fn total(&self) -> usize {
        self.comments.values().map(Vec::len).sum()
    }
}
