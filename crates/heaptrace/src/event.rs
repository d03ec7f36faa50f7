use crate::Fault;

/// Numeric operation codes used by C-style allocator trace hooks.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum TraceOp {
    Allocate = 0,
    Reallocate = 1,
    AllocateZeroed = 2,
    Free = 3,
}

impl TryFrom<u8> for TraceOp {
    type Error = Fault;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(TraceOp::Allocate),
            1 => Ok(TraceOp::Reallocate),
            2 => Ok(TraceOp::AllocateZeroed),
            3 => Ok(TraceOp::Free),
            _ => Err(Fault::UnknownEvent { code }),
        }
    }
}

/// One allocator event, carrying exactly the arguments its operation needs.
///
/// The result pointer and the caller are common to all events and are passed alongside.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TraceEvent {
    Allocate { size: usize },
    Reallocate { old_pointer: usize, new_size: usize },
    AllocateZeroed { count: usize, element_size: usize },
    Free { pointer: usize },
}

impl TraceEvent {
    /// Decodes a raw hook invocation. `args` holds the operation-specific arguments in call
    /// order; unused trailing arguments are ignored.
    pub fn decode(code: u8, args: [usize; 2]) -> Result<Self, Fault> {
        let [first, second] = args;
        Ok(match TraceOp::try_from(code)? {
            TraceOp::Allocate => TraceEvent::Allocate { size: first },
            TraceOp::Reallocate => TraceEvent::Reallocate {
                old_pointer: first,
                new_size: second,
            },
            TraceOp::AllocateZeroed => TraceEvent::AllocateZeroed {
                count: first,
                element_size: second,
            },
            TraceOp::Free => TraceEvent::Free { pointer: first },
        })
    }

    pub fn op(&self) -> TraceOp {
        match self {
            TraceEvent::Allocate { .. } => TraceOp::Allocate,
            TraceEvent::Reallocate { .. } => TraceOp::Reallocate,
            TraceEvent::AllocateZeroed { .. } => TraceOp::AllocateZeroed,
            TraceEvent::Free { .. } => TraceOp::Free,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_every_known_code() {
        assert_eq!(
            TraceEvent::decode(0, [64, 0]),
            Ok(TraceEvent::Allocate { size: 64 })
        );
        assert_eq!(
            TraceEvent::decode(1, [0x1000, 128]),
            Ok(TraceEvent::Reallocate {
                old_pointer: 0x1000,
                new_size: 128
            })
        );
        assert_eq!(
            TraceEvent::decode(2, [4, 16]),
            Ok(TraceEvent::AllocateZeroed {
                count: 4,
                element_size: 16
            })
        );
        assert_eq!(
            TraceEvent::decode(3, [0x1000, 0]),
            Ok(TraceEvent::Free { pointer: 0x1000 })
        );
    }

    #[test]
    fn unknown_code_is_a_fault() {
        assert_eq!(
            TraceEvent::decode(7, [0, 0]),
            Err(Fault::UnknownEvent { code: 7 })
        );
    }

    #[test]
    fn op_round_trips_through_code() {
        let event = TraceEvent::Free { pointer: 1 };
        assert_eq!(TraceOp::try_from(event.op() as u8), Ok(TraceOp::Free));
    }
}
