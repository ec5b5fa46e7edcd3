//! Role based access control.
//!
//! Every handler asks [`authorize`] before it touches the database. The
//! matrix is static and denies anything it does not list. Object level
//! rules and society scoping sit on top of it.

use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::middleware::AuthUser;
use crate::models::UserRole;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Module {
    Society,
    Block,
    Flat,
    User,
    Notice,
    Visitor,
    Complaint,
    Bill,
    Payment,
    Event,
    Alert,
    Contact,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    List,
    Retrieve,
    Create,
    Update,
    Destroy,
    Upload,
    // society
    CreateWithFlats,
    RegenerateFlats,
    MySociety,
    Directory,
    Dashboard,
    // users
    Profile,
    ChangePassword,
    // visitors
    Approve,
    Reject,
    CheckIn,
    CheckOut,
    Active,
    Pending,
    // complaints
    AddUpdate,
    Assign,
    Resolve,
    Close,
    Stats,
    // billing
    MyBills,
    RecordPayment,
    MarkPaid,
    // events
    Upcoming,
    Rsvp,
    // alerts
    Acknowledge,
    UnacknowledgedCount,
    // contact
    MarkRead,
}

use UserRole::{Admin, Committee, Resident, Security};

const EVERYONE: &[UserRole] = &[Admin, Committee, Resident, Security];
const STAFF: &[UserRole] = &[Admin, Committee];
const ADMIN_ONLY: &[UserRole] = &[Admin];
const GATE: &[UserRole] = &[Admin, Committee, Security];
const COMPLAINANTS: &[UserRole] = &[Admin, Committee, Resident];
const NOBODY: &[UserRole] = &[];

fn allowed_roles(module: Module, action: Action) -> &'static [UserRole] {
    use Action::*;

    match module {
        Module::Society => match action {
            List | Retrieve => EVERYONE,
            Create | Update | Destroy => ADMIN_ONLY,
            _ => NOBODY,
        },
        Module::Block => match action {
            List | Retrieve => EVERYONE,
            Create | Update | Destroy | CreateWithFlats | RegenerateFlats => ADMIN_ONLY,
            _ => NOBODY,
        },
        Module::Flat => match action {
            List | Retrieve | MySociety | Dashboard => EVERYONE,
            Create | Update | Destroy | Directory => ADMIN_ONLY,
            _ => NOBODY,
        },
        Module::User => match action {
            Profile | ChangePassword => EVERYONE,
            List | Update => ADMIN_ONLY,
            _ => NOBODY,
        },
        Module::Notice => match action {
            List | Retrieve => EVERYONE,
            Create | Update | Destroy | Upload => STAFF,
            _ => NOBODY,
        },
        Module::Visitor => match action {
            List | Retrieve | Active | Pending | Create | Upload => EVERYONE,
            Update | Destroy | Approve | Reject => GATE,
            CheckIn | CheckOut => &[Admin, Security],
            _ => NOBODY,
        },
        Module::Complaint => match action {
            List | Retrieve | Stats | Create => EVERYONE,
            Update | Destroy | AddUpdate | Upload => COMPLAINANTS,
            Assign | Resolve | Close | Reject => STAFF,
            _ => NOBODY,
        },
        Module::Bill => match action {
            List | Retrieve | MyBills | Stats => EVERYONE,
            Create | Update | Destroy => STAFF,
            MarkPaid => ADMIN_ONLY,
            RecordPayment => COMPLAINANTS,
            _ => NOBODY,
        },
        Module::Payment => match action {
            List | Retrieve => EVERYONE,
            _ => NOBODY,
        },
        Module::Event => match action {
            List | Retrieve | Upcoming | Rsvp => EVERYONE,
            Create | Update | Destroy => STAFF,
            _ => NOBODY,
        },
        Module::Alert => match action {
            List | Retrieve | Active | UnacknowledgedCount | Acknowledge => EVERYONE,
            Create | Update | Destroy => STAFF,
            _ => NOBODY,
        },
        Module::Contact => match action {
            List | MarkRead => ADMIN_ONLY,
            _ => NOBODY,
        },
    }
}

pub fn allows(role: UserRole, module: Module, action: Action) -> bool {
    allowed_roles(module, action).contains(&role)
}

pub fn authorize(user: &AuthUser, module: Module, action: Action) -> AppResult<()> {
    if allows(user.role, module, action) {
        Ok(())
    } else {
        tracing::debug!(
            user_id = %user.user_id,
            role = user.role.as_str(),
            ?module,
            ?action,
            "permission denied"
        );
        Err(AppError::Forbidden)
    }
}

/// Residents may only touch complaints they filed.
pub fn can_modify_complaint(user: &AuthUser, created_by: Uuid) -> bool {
    user.is_staff() || created_by == user.user_id
}

/// Residents may only pay bills of the flat they currently live in.
pub fn can_pay_bill(user: &AuthUser, current_resident: Option<Uuid>) -> bool {
    user.is_staff() || current_resident == Some(user.user_id)
}

/// The set of societies whose rows a user may see.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocietyScope {
    All,
    Society(Uuid),
    Nothing,
}

impl SocietyScope {
    pub fn for_user(role: UserRole, society_id: Option<Uuid>) -> Self {
        match (role, society_id) {
            (_, Some(id)) => SocietyScope::Society(id),
            (UserRole::Admin, None) => SocietyScope::All,
            (_, None) => SocietyScope::Nothing,
        }
    }

    pub fn contains(&self, society_id: Uuid) -> bool {
        match self {
            SocietyScope::All => true,
            SocietyScope::Society(id) => *id == society_id,
            SocietyScope::Nothing => false,
        }
    }

    /// Bind values for the `($n::bool OR x.society_id = $n+1)` filter used by
    /// every scoped query. `Nothing` yields a NULL comparison, which matches no row.
    pub fn bind_values(&self) -> (bool, Option<Uuid>) {
        match self {
            SocietyScope::All => (true, None),
            SocietyScope::Society(id) => (false, Some(*id)),
            SocietyScope::Nothing => (false, None),
        }
    }
}

/// Society the caller acts in when creating tenant rows.
pub fn require_society(user: &AuthUser) -> AppResult<Uuid> {
    user.society_id
        .ok_or_else(|| AppError::BadRequest("User must belong to a society".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(role: UserRole, society_id: Option<Uuid>) -> AuthUser {
        AuthUser {
            user_id: Uuid::new_v4(),
            role,
            society_id,
        }
    }

    #[test]
    fn test_everyone_reads_notices() {
        for role in EVERYONE {
            assert!(allows(*role, Module::Notice, Action::List));
            assert!(allows(*role, Module::Notice, Action::Retrieve));
        }
    }

    #[test]
    fn test_only_staff_write_notices() {
        assert!(allows(Admin, Module::Notice, Action::Create));
        assert!(allows(Committee, Module::Notice, Action::Update));
        assert!(!allows(Resident, Module::Notice, Action::Create));
        assert!(!allows(Security, Module::Notice, Action::Destroy));
    }

    #[test]
    fn test_visitor_gate_actions() {
        assert!(allows(Security, Module::Visitor, Action::CheckIn));
        assert!(allows(Admin, Module::Visitor, Action::CheckOut));
        assert!(!allows(Committee, Module::Visitor, Action::CheckIn));
        assert!(!allows(Resident, Module::Visitor, Action::Approve));
        assert!(allows(Security, Module::Visitor, Action::Approve));
        assert!(allows(Resident, Module::Visitor, Action::Create));
    }

    #[test]
    fn test_billing_matrix() {
        assert!(allows(Resident, Module::Bill, Action::RecordPayment));
        assert!(!allows(Security, Module::Bill, Action::RecordPayment));
        assert!(allows(Admin, Module::Bill, Action::MarkPaid));
        assert!(!allows(Committee, Module::Bill, Action::MarkPaid));
        assert!(!allows(Resident, Module::Bill, Action::Create));
        assert!(allows(Security, Module::Bill, Action::MyBills));
        assert!(!allows(Admin, Module::Payment, Action::Create));
    }

    #[test]
    fn test_complaint_matrix() {
        assert!(allows(Resident, Module::Complaint, Action::AddUpdate));
        assert!(!allows(Security, Module::Complaint, Action::AddUpdate));
        assert!(allows(Security, Module::Complaint, Action::Create));
        assert!(!allows(Resident, Module::Complaint, Action::Assign));
        assert!(allows(Committee, Module::Complaint, Action::Close));
    }

    #[test]
    fn test_admin_only_structure() {
        for action in [Action::Create, Action::Update, Action::Destroy] {
            assert!(allows(Admin, Module::Society, action));
            assert!(!allows(Committee, Module::Society, action));
            assert!(!allows(Committee, Module::Block, action));
            assert!(!allows(Resident, Module::Flat, action));
        }
        assert!(allows(Admin, Module::Block, Action::RegenerateFlats));
        assert!(!allows(Committee, Module::Flat, Action::Directory));
        assert!(allows(Resident, Module::Flat, Action::Dashboard));
    }

    #[test]
    fn test_unlisted_actions_are_denied() {
        assert!(!allows(Admin, Module::Payment, Action::Destroy));
        assert!(!allows(Admin, Module::Society, Action::Rsvp));
        assert!(!allows(Admin, Module::Contact, Action::Update));
    }

    #[test]
    fn test_authorize_returns_forbidden() {
        let resident = user(Resident, Some(Uuid::new_v4()));
        assert!(matches!(
            authorize(&resident, Module::Event, Action::Create),
            Err(AppError::Forbidden)
        ));
        assert!(authorize(&resident, Module::Event, Action::Rsvp).is_ok());
    }

    #[test]
    fn test_object_checks() {
        let resident = user(Resident, Some(Uuid::new_v4()));
        let committee = user(Committee, resident.society_id);

        assert!(can_modify_complaint(&resident, resident.user_id));
        assert!(!can_modify_complaint(&resident, Uuid::new_v4()));
        assert!(can_modify_complaint(&committee, Uuid::new_v4()));

        assert!(can_pay_bill(&resident, Some(resident.user_id)));
        assert!(!can_pay_bill(&resident, None));
        assert!(!can_pay_bill(&resident, Some(Uuid::new_v4())));
        assert!(can_pay_bill(&committee, None));
    }

    #[test]
    fn test_scope_derivation() {
        let society = Uuid::new_v4();
        assert_eq!(SocietyScope::for_user(Admin, None), SocietyScope::All);
        assert_eq!(
            SocietyScope::for_user(Admin, Some(society)),
            SocietyScope::Society(society)
        );
        assert_eq!(SocietyScope::for_user(Resident, None), SocietyScope::Nothing);
        assert_eq!(SocietyScope::for_user(Security, None), SocietyScope::Nothing);
    }

    #[test]
    fn test_scope_contains() {
        let mine = Uuid::new_v4();
        let other = Uuid::new_v4();
        assert!(SocietyScope::All.contains(other));
        assert!(SocietyScope::Society(mine).contains(mine));
        assert!(!SocietyScope::Society(mine).contains(other));
        assert!(!SocietyScope::Nothing.contains(mine));
        assert_eq!(SocietyScope::Nothing.bind_values(), (false, None));
        assert_eq!(SocietyScope::Society(mine).bind_values(), (false, Some(mine)));
    }

    #[test]
    fn test_require_society() {
        assert!(require_society(&user(Admin, None)).is_err());
        let id = Uuid::new_v4();
        assert_eq!(require_society(&user(Committee, Some(id))).unwrap(), id);
    }
}
