//! Lock syscalls (`0x16xx`). Grounded structurally on the teacher's
//! `runtime/src/cond.rs` lock-handle plumbing, but simplified: the VM is
//! single-threaded and non-cooperative by default, so there is no second
//! interpreter thread a real `Mutex` guard would ever contend with.
//! `lock_acquire` mints a fresh handle with a hold count of one instead
//! of returning an actual guard (a guard can't be stored across
//! syscall-call boundaries without unsafe lifetime extension anyway);
//! `lock_release` drops it.

use super::expect_handle;
use crate::error::VmError;
use crate::registry::Registry;
use snow_core::Value;

pub const LOCK_ACQUIRE: u32 = 0x1601;
pub const LOCK_RELEASE: u32 = 0x1602;

#[derive(Default)]
pub struct LockRegistry {
    holds: Registry<()>,
}

pub fn dispatch(code: u32, args: &[Value], registry: &mut LockRegistry) -> Result<Option<Value>, VmError> {
    match code {
        LOCK_ACQUIRE => {
            let handle = registry.holds.insert(());
            Ok(Some(Value::Long(handle)))
        }
        LOCK_RELEASE => {
            let handle = expect_handle(args.first().ok_or(VmError::StackUnderflow)?)?;
            registry
                .holds
                .remove(handle)
                .ok_or(VmError::SlotOutOfRange(handle as u32))?;
            Ok(None)
        }
        other => Err(VmError::UnknownSyscall(other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquire_then_release_clears_the_hold() {
        let mut registry = LockRegistry::default();
        let handle = dispatch(LOCK_ACQUIRE, &[], &mut registry).unwrap().unwrap();
        assert!(matches!(handle, Value::Long(_)));
        let Value::Long(h) = handle else { unreachable!() };
        dispatch(LOCK_RELEASE, &[Value::Long(h)], &mut registry).unwrap();
        assert!(registry.holds.get(h).is_none());
    }

    #[test]
    fn release_without_acquire_is_an_error() {
        let mut registry = LockRegistry::default();
        let err = dispatch(LOCK_RELEASE, &[Value::Int(99)], &mut registry).unwrap_err();
        assert_eq!(err, VmError::SlotOutOfRange(99));
    }
}
