//! # Supervisor Call Numbers
//!
//! The two synchronous traps the kernel recognizes. The number is encoded
//! as the immediate of the `svc` instruction and recovered by the trap
//! handler from the instruction preceding the stacked return address.

use crate::error::TrapError;

/// A supervisor call understood by the trap dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Trap {
    /// Start the thread chosen by the first scheduler pass. Raised once.
    Launch = 3,
    /// Give up the CPU: pend the switch line and return.
    Yield = 100,
}

impl Trap {
    /// The `svc` immediate for this trap.
    #[inline]
    pub const fn number(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for Trap {
    type Error = TrapError;

    fn try_from(number: u8) -> Result<Self, Self::Error> {
        match number {
            3 => Ok(Trap::Launch),
            100 => Ok(Trap::Yield),
            other => Err(TrapError::Unknown(other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_numbers() {
        assert_eq!(Trap::try_from(3), Ok(Trap::Launch));
        assert_eq!(Trap::try_from(100), Ok(Trap::Yield));
        assert_eq!(Trap::Yield.number(), 100);
    }

    #[test]
    fn test_unknown_number() {
        assert_eq!(Trap::try_from(17), Err(TrapError::Unknown(17)));
        assert_eq!(Trap::try_from(0), Err(TrapError::Unknown(0)));
    }
}
