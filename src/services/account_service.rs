//! Accounts and role checks
//!
//! Identity is established by the frontend tier; this service only knows user
//! ids and their role. Everyone registers as a player. Promotions go through an
//! admin, and the first admins come from config.

use std::sync::Arc;

use tracing::info;

use crate::db::{stories, users, Role, StoryDb, StoryRow, UserRow};
use crate::error::StoryError;

use super::events::{EventBus, StoryEvent};

pub struct AccountService {
    db: Arc<StoryDb>,
    events: Arc<EventBus>,
}

impl AccountService {
    pub fn new(db: Arc<StoryDb>, events: Arc<EventBus>) -> Self {
        Self { db, events }
    }

    /// Register a user as a player. Registering again keeps the current role.
    pub fn register(&self, user_id: &str) -> Result<UserRow, StoryError> {
        let user_id = validate_user_id(user_id)?;
        self.db.with_conn(|conn| users::ensure_user(conn, user_id))
    }

    pub fn get_user(&self, user_id: &str) -> Result<UserRow, StoryError> {
        self.db
            .with_conn(|conn| users::get_user(conn, user_id))?
            .ok_or_else(|| StoryError::NotFound(format!("user {}", user_id)))
    }

    /// Change a user's role on behalf of an admin
    pub fn set_role(&self, actor_id: &str, user_id: &str, role: Role) -> Result<UserRow, StoryError> {
        self.require_role(actor_id, Role::Admin)?;
        let user_id = validate_user_id(user_id)?;

        let user = self.db.with_conn(|conn| users::set_role(conn, user_id, role))?;
        self.events.emit(StoryEvent::RoleChanged {
            user_id: user.id.clone(),
            role,
        });
        Ok(user)
    }

    /// Ensure the acting user holds at least `min_role`
    pub fn require_role(&self, actor_id: &str, min_role: Role) -> Result<UserRow, StoryError> {
        let user = self
            .db
            .with_conn(|conn| users::get_user(conn, actor_id))?
            .ok_or_else(|| StoryError::Forbidden(format!("unknown user {}", actor_id)))?;

        if user.role < min_role {
            return Err(StoryError::Forbidden(format!(
                "{} role required, {} is {}",
                min_role, user.id, user.role
            )));
        }
        Ok(user)
    }

    /// Admins edit any story; authors only their own
    pub fn authorize_story_edit(&self, actor_id: &str, story_id: i64) -> Result<StoryRow, StoryError> {
        let user = self.require_role(actor_id, Role::Author)?;
        let story = self.db.with_conn(|conn| stories::require_story(conn, story_id))?;

        if user.role == Role::Admin || story.author_id.as_deref() == Some(user.id.as_str()) {
            return Ok(story);
        }
        Err(StoryError::Forbidden(format!(
            "story {} belongs to another author",
            story_id
        )))
    }

    /// Promote configured users to admin
    pub fn bootstrap_admins(&self, admins: &[String]) -> Result<(), StoryError> {
        for id in admins {
            let id = validate_user_id(id)?;
            self.db.with_conn(|conn| users::set_role(conn, id, Role::Admin))?;
            info!(user = %id, "Bootstrap admin ensured");
        }
        Ok(())
    }
}

fn validate_user_id(user_id: &str) -> Result<&str, StoryError> {
    let trimmed = user_id.trim();
    if trimmed.is_empty() {
        return Err(StoryError::Validation("user_id is required".into()));
    }
    Ok(trimmed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{CreateStoryInput, StoryStatus};

    fn setup() -> (AccountService, Arc<StoryDb>) {
        let db = Arc::new(StoryDb::open_in_memory().unwrap());
        let svc = AccountService::new(db.clone(), Arc::new(EventBus::new()));
        svc.bootstrap_admins(&["root".to_string()]).unwrap();
        (svc, db)
    }

    fn story_by(db: &StoryDb, author: &str) -> i64 {
        db.with_conn(|conn| {
            stories::create_story(
                conn,
                &CreateStoryInput {
                    title: "Owned".into(),
                    description: None,
                    status: StoryStatus::Draft,
                    author_id: Some(author.into()),
                },
            )
        })
        .unwrap()
        .id
    }

    #[test]
    fn test_register_is_player_and_idempotent() {
        let (svc, _db) = setup();
        let user = svc.register("alice").unwrap();
        assert_eq!(user.role, Role::Player);

        svc.set_role("root", "alice", Role::Author).unwrap();
        let again = svc.register("alice").unwrap();
        assert_eq!(again.role, Role::Author);

        assert!(matches!(svc.register("  "), Err(StoryError::Validation(_))));
    }

    #[test]
    fn test_only_admin_sets_roles() {
        let (svc, _db) = setup();
        svc.register("mallory").unwrap();

        let err = svc.set_role("mallory", "mallory", Role::Admin).unwrap_err();
        assert!(matches!(err, StoryError::Forbidden(_)));
        assert_eq!(svc.get_user("mallory").unwrap().role, Role::Player);

        let err = svc.set_role("ghost", "mallory", Role::Admin).unwrap_err();
        assert!(matches!(err, StoryError::Forbidden(_)));
    }

    #[test]
    fn test_require_role_ordering() {
        let (svc, _db) = setup();
        svc.register("bob").unwrap();
        svc.set_role("root", "bob", Role::Author).unwrap();

        assert!(svc.require_role("bob", Role::Player).is_ok());
        assert!(svc.require_role("bob", Role::Author).is_ok());
        assert!(matches!(
            svc.require_role("bob", Role::Admin),
            Err(StoryError::Forbidden(_))
        ));
        assert!(svc.require_role("root", Role::Admin).is_ok());
    }

    #[test]
    fn test_story_edit_ownership() {
        let (svc, db) = setup();
        for author in ["ann", "ben"] {
            svc.register(author).unwrap();
            svc.set_role("root", author, Role::Author).unwrap();
        }
        let story = story_by(&db, "ann");

        assert!(svc.authorize_story_edit("ann", story).is_ok());
        assert!(svc.authorize_story_edit("root", story).is_ok());
        assert!(matches!(
            svc.authorize_story_edit("ben", story),
            Err(StoryError::Forbidden(_))
        ));
        assert!(matches!(
            svc.authorize_story_edit("ann", 999),
            Err(StoryError::NotFound(_))
        ));
    }
}
