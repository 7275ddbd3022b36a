use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use uuid::Uuid;

/// A committed account. Tasks are kept inline and always written back as a whole.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub email: String,
    pub password_hash: String,
    pub tasks: Vec<Task>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: Uuid,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub deadline: DateTime<Utc>,
    #[serde(default)]
    pub complete: bool,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct UserRow {
    pub email: String,
    pub password_hash: String,
    pub tasks: Json<Vec<Task>>,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        Self {
            email: row.email,
            password_hash: row.password_hash,
            tasks: row.tasks.0,
        }
    }
}

impl User {
    pub fn new(email: String, password_hash: String) -> Self {
        Self {
            email,
            password_hash,
            tasks: Vec::new(),
        }
    }

    pub fn task(&self, id: Uuid) -> Option<&Task> {
        self.tasks.iter().find(|task| task.id == id)
    }

    /// Replaces the task sharing `updated.id`. Returns `false` when no such task exists.
    pub fn replace_task(&mut self, updated: Task) -> bool {
        match self.tasks.iter_mut().find(|task| task.id == updated.id) {
            Some(slot) => {
                *slot = updated;
                true
            }
            None => false,
        }
    }

    pub fn remove_task(&mut self, id: Uuid) -> Option<Task> {
        let idx = self.tasks.iter().position(|task| task.id == id)?;
        Some(self.tasks.remove(idx))
    }
}

impl Task {
    pub fn new(title: String, description: String, deadline: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            title,
            description,
            deadline,
            complete: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn task(title: &str) -> Task {
        Task::new(
            title.to_string(),
            String::new(),
            Utc.with_ymd_and_hms(2099, 1, 1, 0, 0, 0).unwrap(),
        )
    }

    #[test]
    fn replace_keeps_order_and_id() {
        let mut user = User::new("a@b.com".into(), "hash".into());
        let (first, second) = (task("first"), task("second"));
        user.tasks = vec![first.clone(), second.clone()];

        let mut edited = first.clone();
        edited.title = "edited".into();
        edited.complete = true;
        assert!(user.replace_task(edited));

        assert_eq!(user.tasks[0].id, first.id);
        assert_eq!(user.tasks[0].title, "edited");
        assert_eq!(user.tasks[1], second);
    }

    #[test]
    fn replace_of_unknown_task_is_rejected() {
        let mut user = User::new("a@b.com".into(), "hash".into());
        user.tasks.push(task("only"));
        assert!(!user.replace_task(task("stranger")));
        assert_eq!(user.tasks.len(), 1);
    }

    #[test]
    fn remove_returns_removed_task() {
        let mut user = User::new("a@b.com".into(), "hash".into());
        let t = task("gone");
        user.tasks.push(t.clone());
        assert_eq!(user.remove_task(t.id), Some(t));
        assert!(user.tasks.is_empty());
        assert_eq!(user.remove_task(Uuid::new_v4()), None);
    }

    #[test]
    fn task_body_defaults_optional_fields() {
        let id = Uuid::new_v4();
        let body = format!(
            r#"{{"id":"{}","title":"t","deadline":"2099-01-01T00:00:00Z"}}"#,
            id
        );
        let task: Task = serde_json::from_str(&body).unwrap();
        assert_eq!(task.id, id);
        assert_eq!(task.description, "");
        assert!(!task.complete);
    }
}
