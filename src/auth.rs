use crate::engine::EngineError;
use crate::model::SubjectId;

/// Ordered by privilege.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Role {
    Guest,
    Staff,
    Admin,
}

/// Identity of an already-authenticated caller, handed in by the API layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Claims {
    pub subject: SubjectId,
    pub role: Role,
}

impl Claims {
    pub fn guest(subject: SubjectId) -> Self {
        Self {
            subject,
            role: Role::Guest,
        }
    }

    pub fn staff(subject: SubjectId) -> Self {
        Self {
            subject,
            role: Role::Staff,
        }
    }

    pub fn admin(subject: SubjectId) -> Self {
        Self {
            subject,
            role: Role::Admin,
        }
    }

    pub fn require(&self, role: Role, action: &'static str) -> Result<(), EngineError> {
        if self.role >= role {
            Ok(())
        } else {
            Err(self.forbidden(action))
        }
    }

    /// Owners act on their own reservations; staff act on anyone's.
    pub fn require_owner_or_staff(
        &self,
        owner: SubjectId,
        action: &'static str,
    ) -> Result<(), EngineError> {
        if self.subject == owner || self.role >= Role::Staff {
            Ok(())
        } else {
            Err(self.forbidden(action))
        }
    }

    fn forbidden(&self, action: &'static str) -> EngineError {
        EngineError::Forbidden {
            subject: self.subject,
            action,
        }
    }
}
