// SPDX-FileCopyrightText: 2026 Marginalia Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for marginalia.
//!
//! Provides the error type, the shared domain types (books, notes, chat
//! messages, membership tiers), and the adapter traits implemented by the
//! quota stores, the backend client, and the completion client.

pub mod error;
pub mod traits;
pub mod types;

// Re-export key items at crate root for ergonomic imports.
pub use error::MarginaliaError;
pub use types::{
    AdapterType, BackendCredential, Book, BookNotes, ChatMessage, DailyLimit, HealthStatus,
    MembershipTier, Note, Role,
};

pub use traits::{
    BookBackend, ByteStream, CompletionProvider, IncrementOutcome, PluginAdapter, QuotaStore,
};

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;

    #[test]
    fn error_variants_render() {
        let exceeded = MarginaliaError::QuotaExceeded {
            subject: "u1".into(),
            limit: 10,
        };
        assert_eq!(
            exceeded.to_string(),
            "daily quota exceeded for u1 (limit 10)"
        );

        let backend = MarginaliaError::backend("token expired");
        assert!(backend.to_string().contains("token expired"));

        let unsupported = MarginaliaError::UnsupportedTool("delete_books".into());
        assert!(unsupported.to_string().contains("delete_books"));
    }

    #[test]
    fn membership_tier_parses_any_case() {
        assert_eq!(MembershipTier::from_str("pro").unwrap(), MembershipTier::Pro);
        assert_eq!(MembershipTier::from_str("PLUS").unwrap(), MembershipTier::Plus);
        assert_eq!(MembershipTier::Free.to_string(), "FREE");
        assert!(MembershipTier::from_str("gold").is_err());
    }

    #[test]
    fn membership_tier_wire_format() {
        let json = serde_json::to_string(&MembershipTier::Pro).unwrap();
        assert_eq!(json, "\"PRO\"");
        let parsed: MembershipTier = serde_json::from_str("\"FREE\"").unwrap();
        assert_eq!(parsed, MembershipTier::Free);
    }

    #[test]
    fn daily_limit_sentinel() {
        assert_eq!(DailyLimit::Unbounded.as_wire(), -1);
        assert_eq!(DailyLimit::Bounded(10).as_wire(), 10);
        assert_eq!(DailyLimit::Bounded(10).ceiling(), Some(10));
        assert_eq!(DailyLimit::Unbounded.ceiling(), None);
    }

    #[test]
    fn credential_debug_is_redacted() {
        let cred = BackendCredential::new("secret-token");
        let debug = format!("{cred:?}");
        assert!(!debug.contains("secret-token"));
        assert!(debug.contains("[redacted]"));
        assert_eq!(cred.as_str(), "secret-token");
    }

    #[test]
    fn role_serializes_lowercase() {
        let msg = ChatMessage::user("hi");
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["role"], "user");
        assert_eq!(Role::from_str("assistant").unwrap(), Role::Assistant);
    }

    #[test]
    fn book_accepts_backend_aliases() {
        let json = r#"{"bookId":"b1","title":"原则","author":"瑞·达利欧","bookmarkCount":12,"reviewCount":3}"#;
        let book: Book = serde_json::from_str(json).unwrap();
        assert_eq!(book.highlight_count, 12);
        assert_eq!(book.note_count, 3);
        assert!(book.cover.is_none());
    }

    #[test]
    fn note_full_text_skips_missing_parts() {
        let note = Note {
            book_id: "b1".into(),
            excerpt: Some("痛苦+反思=进步".into()),
            book_title: Some("原则".into()),
            ..Note::default()
        };
        assert_eq!(note.full_text(), "痛苦+反思=进步\n原则");
    }

    #[test]
    fn all_trait_modules_are_exported() {
        fn _assert_backend<T: BookBackend>() {}
        fn _assert_completion<T: CompletionProvider>() {}
        fn _assert_quota_store<T: QuotaStore>() {}
        fn _assert_plugin_adapter<T: PluginAdapter>() {}
    }
}
