//! Table definitions, one per record type.

use crate::SisError;
use crate::types::{
    Achievement, AchievementId, Attendance, AttendanceId, ClassGroup, ClassGroupId, Course,
    CourseId, Department, DepartmentId, DisciplinaryAction, DisciplinaryId, Enrollment,
    EnrollmentId, FeePlan, FeePlanId, Installment, InstallmentId, LecturerId, LecturerProfile,
    Notification, NotificationId, Parent, ParentId, StudentId, StudentProfile, Subject, SubjectId,
    User, UserId,
};
use redb::{TableDefinition, WriteTransaction};
use serde::Serialize;
use serde::de::DeserializeOwned;

/// A record stored in its own `u64 -> bytes` table.
pub trait Record: Serialize + DeserializeOwned {
    /// Typed identifier of the record.
    type Id: Copy + Into<u64> + From<u64>;

    /// Backing table.
    const TABLE: TableDefinition<'static, u64, &'static [u8]>;

    /// Human readable name, also the key of the id sequence.
    const NAME: &'static str;

    fn id(&self) -> Self::Id;

    fn set_id(&mut self, id: Self::Id);
}

macro_rules! record {
    ($ty:ty, $id:ty, $table:literal, $name:literal) => {
        impl Record for $ty {
            type Id = $id;
            const TABLE: TableDefinition<'static, u64, &'static [u8]> =
                TableDefinition::new($table);
            const NAME: &'static str = $name;

            fn id(&self) -> $id {
                self.id
            }

            fn set_id(&mut self, id: $id) {
                self.id = id;
            }
        }
    };
}

record!(User, UserId, "users", "User");
record!(Department, DepartmentId, "departments", "Department");
record!(Course, CourseId, "courses", "Course");
record!(Subject, SubjectId, "subjects", "Subject");
record!(ClassGroup, ClassGroupId, "class_groups", "Class group");
record!(LecturerProfile, LecturerId, "lecturers", "Lecturer");
record!(StudentProfile, StudentId, "students", "Student");
record!(Parent, ParentId, "parents", "Parent");
record!(Enrollment, EnrollmentId, "enrollments", "Enrollment");
record!(Attendance, AttendanceId, "attendance", "Attendance");
record!(Achievement, AchievementId, "achievements", "Achievement");
record!(
    DisciplinaryAction,
    DisciplinaryId,
    "disciplinary_actions",
    "Disciplinary action"
);
record!(FeePlan, FeePlanId, "fee_plans", "Fee plan");
record!(Installment, InstallmentId, "installments", "Installment");
record!(Notification, NotificationId, "notifications", "Notification");

fn create<R: Record>(txn: &WriteTransaction) -> Result<(), SisError> {
    let _ = txn.open_table(R::TABLE).map_err(super::io_err)?;
    Ok(())
}

/// Open (and thereby create) every record table.
pub(super) fn create_all(txn: &WriteTransaction) -> Result<(), SisError> {
    create::<User>(txn)?;
    create::<Department>(txn)?;
    create::<Course>(txn)?;
    create::<Subject>(txn)?;
    create::<ClassGroup>(txn)?;
    create::<LecturerProfile>(txn)?;
    create::<StudentProfile>(txn)?;
    create::<Parent>(txn)?;
    create::<Enrollment>(txn)?;
    create::<Attendance>(txn)?;
    create::<Achievement>(txn)?;
    create::<DisciplinaryAction>(txn)?;
    create::<FeePlan>(txn)?;
    create::<Installment>(txn)?;
    create::<Notification>(txn)?;
    Ok(())
}
