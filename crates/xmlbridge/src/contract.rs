//! Contract assertions
//!
//! The bridge's memory safety rests on these checks, so they run in every
//! build. A failed check becomes a [`ContractViolation`] handed to the
//! installed hook, which decides between aborting and handing the violation
//! back to the caller as [`XmlError::Contract`].

use crate::error::XmlError;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use thiserror::Error;

/// A broken precondition: which operation, on what, and why
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("contract violated in `{operation}` on {object}: {description}")]
pub struct ContractViolation {
    pub operation: &'static str,
    pub object: String,
    pub description: String,
}

/// What to do with a violation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Panic
    Abort,
    /// Return `Err(XmlError::Contract)` to the caller
    Propagate,
}

pub type ViolationHook = Rc<dyn Fn(&ContractViolation) -> Disposition>;

/// Holds the failure hook for one heap
pub struct ContractAssertions {
    default: Disposition,
    hook: RefCell<Option<ViolationHook>>,
}

impl ContractAssertions {
    pub fn new(default: Disposition) -> Self {
        Self {
            default,
            hook: RefCell::new(None),
        }
    }

    /// Replace the hook
    pub fn set_hook<F>(&self, hook: F)
    where
        F: Fn(&ContractViolation) -> Disposition + 'static,
    {
        *self.hook.borrow_mut() = Some(Rc::new(hook));
    }

    /// Go back to the configured default disposition
    pub fn reset_hook(&self) {
        self.hook.borrow_mut().take();
    }

    /// Check `condition`; on failure report a violation
    pub fn check(
        &self,
        condition: bool,
        operation: &'static str,
        object: impl fmt::Display,
        description: &str,
    ) -> Result<(), XmlError> {
        if condition {
            Ok(())
        } else {
            Err(self.violation(operation, object, description))
        }
    }

    /// Report a violation unconditionally. Returns the error to propagate
    /// when the hook does not abort.
    pub fn violation(
        &self,
        operation: &'static str,
        object: impl fmt::Display,
        description: &str,
    ) -> XmlError {
        let violation = ContractViolation {
            operation,
            object: object.to_string(),
            description: description.to_string(),
        };
        tracing::error!(operation, object = %violation.object, "{}", violation.description);

        // Clone the hook out so it may touch this heap again
        let hook = self.hook.borrow().clone();
        let disposition = match hook {
            Some(hook) => hook(&violation),
            None => self.default,
        };

        match disposition {
            Disposition::Abort => panic!("{violation}"),
            Disposition::Propagate => XmlError::Contract(violation),
        }
    }
}

impl fmt::Debug for ContractAssertions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContractAssertions")
            .field("default", &self.default)
            .field("custom_hook", &self.hook.borrow().is_some())
            .finish()
    }
}

impl Default for ContractAssertions {
    fn default() -> Self {
        Self::new(Disposition::Abort)
    }
}
