//! Delivery-handler verdicts.
//!
//! A [`Decision`] tells the queue what to do with a message at an extension
//! point: keep the normal flow or interrupt it, persist it, delete it, put it
//! back into the store, and whether to acknowledge the producer. When several
//! hooks fire for one message their decisions are folded with
//! [`Decision::combine`].

use serde::{Deserialize, Serialize};

/// How a message is re-queued.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PutBackDecision {
    /// Do not put the message back.
    #[default]
    No,
    /// Re-queue into the regular partition.
    Regular,
    /// Re-queue into the priority partition.
    Priority,
}

impl PutBackDecision {
    pub fn is_no(self) -> bool {
        self == PutBackDecision::No
    }
}

/// Acknowledgment sent back to the producer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionTransmission {
    #[default]
    None,
    Success,
    Failed,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Decision {
    pub interrupt: bool,
    pub save: bool,
    pub delete: bool,
    pub put_back: PutBackDecision,
    pub transmission: DecisionTransmission,
}

impl Decision {
    pub const fn new(
        interrupt: bool,
        save: bool,
        delete: bool,
        put_back: PutBackDecision,
        transmission: DecisionTransmission,
    ) -> Self {
        Self {
            interrupt,
            save,
            delete,
            put_back,
            transmission,
        }
    }

    /// Continue the normal flow, nothing else.
    pub const fn allow() -> Self {
        Self::new(
            false,
            false,
            false,
            PutBackDecision::No,
            DecisionTransmission::None,
        )
    }

    /// Stop the normal flow for this message.
    pub const fn interrupt_flow() -> Self {
        Self::new(
            true,
            false,
            false,
            PutBackDecision::No,
            DecisionTransmission::None,
        )
    }

    pub const fn save_message() -> Self {
        Self::new(
            false,
            true,
            false,
            PutBackDecision::No,
            DecisionTransmission::None,
        )
    }

    pub const fn delete_message() -> Self {
        Self::new(
            false,
            false,
            true,
            PutBackDecision::No,
            DecisionTransmission::None,
        )
    }

    pub const fn put_back_message(priority: bool) -> Self {
        let put_back = if priority {
            PutBackDecision::Priority
        } else {
            PutBackDecision::Regular
        };
        Self::new(false, false, false, put_back, DecisionTransmission::None)
    }

    pub const fn transmit(transmission: DecisionTransmission) -> Self {
        Self::new(false, false, false, PutBackDecision::No, transmission)
    }

    pub const fn with_transmission(mut self, transmission: DecisionTransmission) -> Self {
        self.transmission = transmission;
        self
    }

    /// Merges `other` into `self`.
    ///
    /// Flags are OR-ed; `put_back` and `transmission` take `other`'s value
    /// unless it is the neutral one.
    pub fn combine(self, other: Decision) -> Decision {
        Decision {
            interrupt: self.interrupt || other.interrupt,
            save: self.save || other.save,
            delete: self.delete || other.delete,
            put_back: if other.put_back != PutBackDecision::No {
                other.put_back
            } else {
                self.put_back
            },
            transmission: if other.transmission != DecisionTransmission::None {
                other.transmission
            } else {
                self.transmission
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn combine_ors_flags_and_prefers_later_modes() {
        let a = Decision::new(
            false,
            true,
            false,
            PutBackDecision::Regular,
            DecisionTransmission::Success,
        );
        let b = Decision::new(
            true,
            false,
            true,
            PutBackDecision::No,
            DecisionTransmission::Failed,
        );

        let merged = a.combine(b);
        assert!(merged.interrupt && merged.save && merged.delete);
        assert_eq!(merged.put_back, PutBackDecision::Regular);
        assert_eq!(merged.transmission, DecisionTransmission::Failed);
    }

    #[test]
    fn combine_is_associative() {
        let decisions = [
            Decision::save_message(),
            Decision::put_back_message(true),
            Decision::transmit(DecisionTransmission::Success),
            Decision::delete_message(),
            Decision::put_back_message(false),
            Decision::interrupt_flow(),
        ];

        for a in decisions {
            for b in decisions {
                for c in decisions {
                    assert_eq!(a.combine(b).combine(c), a.combine(b.combine(c)));
                }
            }
        }
    }

    #[test]
    fn allow_is_neutral() {
        let d = Decision::put_back_message(true).with_transmission(DecisionTransmission::Failed);
        assert_eq!(Decision::allow().combine(d), d);
        assert_eq!(d.combine(Decision::allow()), d);
    }
}
