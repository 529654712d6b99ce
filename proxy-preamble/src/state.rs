use crate::SIGNATURE;

/// Where the evaluation of a connection's preamble stands
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProxyState {
    /// Signature bytes still to be confirmed
    Unmatched(u8),
    /// Signature confirmed, accumulating the rest of the line
    Reading,
    /// Header extracted and spliced out of the buffer
    Valid,
    /// No preamble, or a broken one
    Invalid,
}

impl Default for ProxyState {
    fn default() -> Self {
        ProxyState::Unmatched(SIGNATURE.len() as u8)
    }
}

impl ProxyState {
    /// Once terminal, the state never changes again
    pub fn is_terminal(self) -> bool {
        matches!(self, ProxyState::Valid | ProxyState::Invalid)
    }
}

/// Feed freshly read bytes to the signature matcher.
///
/// Each byte is compared against the signature position implied by the countdown.
/// A mismatch is final, remaining bytes are not looked at. A countdown outside the
/// signature never matches.
pub fn match_signature(mut state: ProxyState, bytes: &[u8]) -> ProxyState {
    for &byte in bytes {
        let left = match state {
            ProxyState::Unmatched(left) => left,
            _ => break,
        };
        let expected = SIGNATURE
            .len()
            .checked_sub(left as usize)
            .and_then(|pos| SIGNATURE.get(pos));
        state = match expected {
            Some(&expected) if expected == byte => {
                if left == 1 {
                    ProxyState::Reading
                } else {
                    ProxyState::Unmatched(left - 1)
                }
            }
            _ => ProxyState::Invalid,
        };
    }
    state
}
