//! Permission predicates, evaluated per request against an explicit
//! principal — there is no ambient current-user state.

use ulid::Ulid;

use crate::auth::Principal;

/// Unauthorized is decided before any object lookup; Forbidden only after
/// the target object is identified.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessError {
    /// No or invalid credentials on a protected operation.
    Unauthorized,
    /// Valid credentials, insufficient rights on the identified object.
    Forbidden,
}

/// Room reads are open to everyone, including anonymous callers; writes
/// require a superuser.
pub fn ensure_room_write(principal: Option<&Principal>) -> Result<(), AccessError> {
    match principal {
        None => Err(AccessError::Unauthorized),
        Some(p) if p.is_superuser => Ok(()),
        Some(_) => Err(AccessError::Forbidden),
    }
}

/// Every booking operation requires an authenticated principal.
pub fn ensure_authenticated(principal: Option<&Principal>) -> Result<&Principal, AccessError> {
    principal.ok_or(AccessError::Unauthorized)
}

/// Booking detail and delete: the owning client or a superuser.
pub fn ensure_booking_owner(principal: &Principal, client: Ulid) -> Result<(), AccessError> {
    if principal.is_superuser || principal.user_id == client {
        Ok(())
    } else {
        Err(AccessError::Forbidden)
    }
}

/// Booking update, full or partial, is superuser-only.
pub fn ensure_booking_update(principal: &Principal) -> Result<(), AccessError> {
    if principal.is_superuser {
        Ok(())
    } else {
        Err(AccessError::Forbidden)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn principal(is_superuser: bool) -> Principal {
        Principal {
            user_id: Ulid::new(),
            username: "guest".into(),
            is_superuser,
        }
    }

    #[test]
    fn room_writes_gated_by_role() {
        assert_eq!(ensure_room_write(None), Err(AccessError::Unauthorized));
        assert_eq!(
            ensure_room_write(Some(&principal(false))),
            Err(AccessError::Forbidden)
        );
        assert_eq!(ensure_room_write(Some(&principal(true))), Ok(()));
    }

    #[test]
    fn bookings_require_authentication() {
        assert!(ensure_authenticated(None).is_err());
        let p = principal(false);
        assert_eq!(ensure_authenticated(Some(&p)).unwrap().user_id, p.user_id);
    }

    #[test]
    fn owner_or_superuser_reads_and_deletes() {
        let owner = principal(false);
        let stranger = principal(false);
        let admin = principal(true);

        assert_eq!(ensure_booking_owner(&owner, owner.user_id), Ok(()));
        assert_eq!(
            ensure_booking_owner(&stranger, owner.user_id),
            Err(AccessError::Forbidden)
        );
        assert_eq!(ensure_booking_owner(&admin, owner.user_id), Ok(()));
    }

    #[test]
    fn only_superuser_updates_bookings() {
        let owner = principal(false);
        // Even the owning client may not update its own booking.
        assert_eq!(ensure_booking_update(&owner), Err(AccessError::Forbidden));
        assert_eq!(ensure_booking_update(&principal(true)), Ok(()));
    }
}
