//! The error-trapping token table: a pooled set of opaque integer
//! handles, each in one of two states. A token identifies a lexical
//! region in which `On Error Resume Next` may be active; the single
//! trapped-error slot lives on the facade, not here, because VBScript
//! tracks one current error regardless of how many traps are nested.

use std::collections::HashMap;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TrapState {
    /// trap inactive; errors propagate
    Goto0,
    /// trap active; errors are recorded and swallowed
    ResumeNext,
}

#[derive(Debug, Default)]
pub(crate) struct TokenTable {
    states: HashMap<usize, TrapState>,
    pool: Vec<usize>,
    next: usize,
}

impl TokenTable {
    /// Allocate a token in the `Goto0` state, reusing pooled ids
    pub fn acquire(&mut self) -> usize {
        let token = self.pool.pop().unwrap_or_else(|| {
            let id = self.next;
            self.next += 1;
            id
        });
        self.states.insert(token, TrapState::Goto0);
        token
    }

    pub fn release(&mut self, token: usize) {
        if self.states.remove(&token).is_some() {
            self.pool.push(token);
        }
    }

    pub fn set_state(&mut self, token: usize, state: TrapState) {
        if let Some(slot) = self.states.get_mut(&token) {
            *slot = state;
        }
    }

    pub fn state(&self, token: usize) -> TrapState {
        self.states
            .get(&token)
            .copied()
            .unwrap_or(TrapState::Goto0)
    }

    /// Live token count, used to check the pool invariant in tests
    pub fn live(&self) -> usize {
        self.states.len()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn tokens_pool_and_start_inactive() {
        let mut table = TokenTable::default();
        let a = table.acquire();
        let b = table.acquire();
        assert_ne!(a, b);
        assert_eq!(table.state(a), TrapState::Goto0);
        table.set_state(a, TrapState::ResumeNext);
        table.release(a);
        let c = table.acquire();
        // the pooled id comes back, in the inactive state again
        assert_eq!(c, a);
        assert_eq!(table.state(c), TrapState::Goto0);
        assert_eq!(table.live(), 2);
    }
}
