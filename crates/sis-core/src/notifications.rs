//! Stored notifications and lecturer-to-student messages.

use crate::accounts::user_by_email;
use crate::primitives::MAX_TEXT_LENGTH;
use crate::storage::{Reader, Record, Store};
use crate::types::{Notification, NotificationId, Role, User, UserId};
use crate::validation::Validator;
use crate::SisError;
use chrono::{DateTime, Utc};
use serde::Deserialize;

pub const STUDENT_NOT_FOUND: &str = "Student not found.";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MessageForm {
    pub student_email: String,
    pub message: String,
}

/// Deliver a message from `sender` to the student with the given email.
///
/// The message is stored as a notification of the student, and the sender
/// keeps a "Message sent to ..." copy in their own inbox. Nothing is emailed.
/// Returns the student's copy.
pub fn send_message(
    store: &Store,
    sender: &User,
    form: &MessageForm,
    now: DateTime<Utc>,
) -> Result<Notification, SisError> {
    store.write(|tx| {
        let mut v = Validator::new();
        let email = v.email("student_email", &form.student_email);
        let message = v.required("message", &form.message, MAX_TEXT_LENGTH);
        v.finish()?;

        let recipient = user_by_email(tx, &email)?
            .filter(|u| u.role == Role::Student)
            .ok_or_else(|| SisError::field("student_email", STUDENT_NOT_FOUND))?;

        tx.insert(Notification {
            id: NotificationId::default(),
            recipient_id: sender.id,
            sender_id: Some(sender.id),
            message: format!("Message sent to {}: {}", recipient.display_name(), message),
            created_at: now,
            is_read: false,
        })?;
        tx.insert(Notification {
            id: NotificationId::default(),
            recipient_id: recipient.id,
            sender_id: Some(sender.id),
            message,
            created_at: now,
            is_read: false,
        })
    })
}

/// A user's notifications, newest first.
pub fn list_for(r: &impl Reader, user: UserId) -> Result<Vec<Notification>, SisError> {
    let mut items = r.filter::<Notification>(|n| n.recipient_id == user)?;
    items.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
    Ok(items)
}

pub fn unread_count(r: &impl Reader, user: UserId) -> Result<usize, SisError> {
    Ok(r
        .filter::<Notification>(|n| n.recipient_id == user && !n.is_read)?
        .len())
}

/// Mark one of the user's notifications as read.
///
/// Someone else's notification is reported as not found.
pub fn mark_read(
    store: &Store,
    user: UserId,
    id: NotificationId,
) -> Result<Notification, SisError> {
    store.write(|tx| {
        let mut note = tx.fetch::<Notification>(id)?;
        if note.recipient_id != user {
            return Err(SisError::NotFound(Notification::NAME));
        }
        note.is_read = true;
        tx.put(&note)?;
        Ok(note)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accounts::{NewUser, create_user};
    use tempfile::tempdir;

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(1_717_000_000 + secs, 0).expect("timestamp")
    }

    fn setup() -> (tempfile::TempDir, Store, User, User) {
        let dir = tempdir().expect("tempdir");
        let store = Store::open(dir.path().join("sis.redb")).expect("open store");
        let (lecturer, student) = store
            .write(|tx| {
                let lecturer =
                    create_user(tx, NewUser::new("l@x.com", "IC-L", "Lee", Role::Lecturer, at(0)))?;
                let student =
                    create_user(tx, NewUser::new("s@x.com", "IC-S", "Sam", Role::Student, at(0)))?;
                Ok((lecturer, student))
            })
            .expect("users");
        (dir, store, lecturer, student)
    }

    fn message(to: &str, text: &str) -> MessageForm {
        MessageForm {
            student_email: to.into(),
            message: text.into(),
        }
    }

    #[test]
    fn test_message_reaches_student_inbox() {
        let (_dir, store, lecturer, student) = setup();
        send_message(&store, &lecturer, &message("S@X.com", "first"), at(1)).expect("send");
        send_message(&store, &lecturer, &message("s@x.com", "second"), at(2)).expect("send");

        let read = store.read().expect("read");
        let inbox = list_for(&read, student.id).expect("list");
        assert_eq!(inbox.len(), 2);
        assert_eq!(inbox[0].message, "second");
        assert_eq!(inbox[0].sender_id, Some(lecturer.id));
        assert_eq!(unread_count(&read, student.id).expect("count"), 2);
    }

    #[test]
    fn test_sender_keeps_a_copy() {
        let (_dir, store, lecturer, student) = setup();
        send_message(&store, &lecturer, &message("s@x.com", "see me"), at(1)).expect("send");

        let read = store.read().expect("read");
        let outbox = list_for(&read, lecturer.id).expect("list");
        assert_eq!(outbox.len(), 1);
        assert_eq!(outbox[0].message, "Message sent to Sam: see me");
        assert_eq!(outbox[0].sender_id, Some(lecturer.id));
        assert_eq!(unread_count(&read, lecturer.id).expect("count"), 1);
        assert_eq!(list_for(&read, student.id).expect("list")[0].message, "see me");
    }

    #[test]
    fn test_message_to_non_student_fails() {
        let (_dir, store, lecturer, _) = setup();
        let err = send_message(&store, &lecturer, &message("l@x.com", "hi"), at(1))
            .expect_err("lecturer is not a student");
        let SisError::Validation(errors) = err else {
            unreachable!("validation error expected");
        };
        assert_eq!(errors.field("student_email"), [STUDENT_NOT_FOUND.to_string()]);
    }

    #[test]
    fn test_only_owner_marks_read() {
        let (_dir, store, lecturer, student) = setup();
        let note = send_message(&store, &lecturer, &message("s@x.com", "hi"), at(1)).expect("send");
        assert!(matches!(
            mark_read(&store, lecturer.id, note.id),
            Err(SisError::NotFound(_))
        ));
        let read_note = mark_read(&store, student.id, note.id).expect("mark");
        assert!(read_note.is_read);
        assert_eq!(
            unread_count(&store.read().expect("read"), student.id).expect("count"),
            0
        );
    }
}
