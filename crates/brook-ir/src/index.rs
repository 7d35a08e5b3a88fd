use std::collections::{HashMap, HashSet};

use smallvec::SmallVec;
use thiserror::Error;

use crate::spec::{Computation, InstrId, Instruction};

/// Structural indices for a single computation arena.
///
/// Building the indices doubles as graph verification: instruction ids must
/// be unique, every operand must refer to an instruction declared earlier in
/// the body, and the root must be defined. A computation that passes
/// `build` is acyclic by construction.
#[derive(Debug, Clone)]
pub struct ComputationIndices {
    pub pos_of: HashMap<InstrId, usize>,
    pub users: HashMap<InstrId, SmallVec<[InstrId; 4]>>,
    pub next_id: u32,
}

impl ComputationIndices {
    pub fn build(computation: &Computation) -> Result<Self, IndexError> {
        let mut seen: HashSet<InstrId> = HashSet::new();
        let mut pos_of = HashMap::with_capacity(computation.body.len());
        let mut users: HashMap<InstrId, SmallVec<[InstrId; 4]>> = HashMap::new();
        let mut max_id = 0u32;

        for (index, instruction) in computation.body.iter().enumerate() {
            for operand in &instruction.operands {
                if !seen.contains(operand) {
                    return Err(IndexError::UndefinedOperand {
                        user: instruction.id,
                        operand: *operand,
                    });
                }
                users.entry(*operand).or_default().push(instruction.id);
            }
            if !seen.insert(instruction.id) {
                return Err(IndexError::DuplicateInstruction {
                    instruction: instruction.id,
                });
            }
            pos_of.insert(instruction.id, index);
            max_id = max_id.max(instruction.id.0).max(wrapped_max_id(instruction));
        }

        if !seen.contains(&computation.root_id) {
            return Err(IndexError::UndefinedRoot {
                root: computation.root_id,
            });
        }

        Ok(ComputationIndices {
            pos_of,
            users,
            next_id: max_id + 1,
        })
    }

    /// Returns the arena position for the provided identifier.
    pub fn position(&self, id: InstrId) -> Option<usize> {
        self.pos_of.get(&id).copied()
    }

    pub fn contains(&self, id: InstrId) -> bool {
        self.pos_of.contains_key(&id)
    }

    /// Returns the recorded consumers of an instruction's value.
    pub fn users_of(&self, id: InstrId) -> &[InstrId] {
        self.users
            .get(&id)
            .map(|list| list.as_slice())
            .unwrap_or(&[])
    }

    pub fn ordered_ids(&self) -> Vec<InstrId> {
        let mut entries: Vec<_> = self.pos_of.iter().map(|(id, pos)| (*id, *pos)).collect();
        entries.sort_by_key(|&(_, pos)| pos);
        entries.into_iter().map(|(id, _)| id).collect()
    }

    pub(crate) fn allocate_id(&mut self) -> InstrId {
        let id = InstrId(self.next_id);
        self.next_id += 1;
        id
    }

    pub(crate) fn insert_instruction(
        &mut self,
        pos: usize,
        instruction: &Instruction,
    ) -> Result<(), IndexError> {
        if self.pos_of.contains_key(&instruction.id) {
            return Err(IndexError::DuplicateInstruction {
                instruction: instruction.id,
            });
        }
        self.shift_positions_from(pos, 1);
        self.pos_of.insert(instruction.id, pos);
        for operand in &instruction.operands {
            if !self.pos_of.contains_key(operand) {
                return Err(IndexError::UndefinedOperand {
                    user: instruction.id,
                    operand: *operand,
                });
            }
            self.users.entry(*operand).or_default().push(instruction.id);
        }
        Ok(())
    }

    /// Removes an instruction from the positional and use maps.
    ///
    /// The users recorded *for* the removed instruction are kept so a
    /// follow-up [`Self::redirect_uses`] can still find its consumers.
    pub(crate) fn detach_instruction(&mut self, instruction: &Instruction) {
        if let Some(pos) = self.pos_of.remove(&instruction.id) {
            self.shift_positions_from(pos + 1, -1);
        }
        for operand in &instruction.operands {
            if let Some(list) = self.users.get_mut(operand) {
                list.retain(|id| *id != instruction.id);
                if list.is_empty() {
                    self.users.remove(operand);
                }
            }
        }
    }

    pub(crate) fn redirect_uses(&mut self, from: InstrId, to: InstrId) {
        if from == to {
            return;
        }
        let Some(consumers) = self.users.remove(&from) else {
            return;
        };
        self.users.entry(to).or_default().extend(consumers);
    }

    fn shift_positions_from(&mut self, start: usize, delta: isize) {
        for (_, pos) in self.pos_of.iter_mut() {
            if *pos >= start {
                if delta.is_positive() {
                    *pos += delta.unsigned_abs();
                } else {
                    *pos -= delta.unsigned_abs();
                }
            }
        }
    }
}

// Ids nested inside an async-start payload stay retired; the allocator must
// never reissue them.
fn wrapped_max_id(instruction: &Instruction) -> u32 {
    instruction
        .async_wrapped()
        .map(|wrapped| wrapped.id.0.max(wrapped_max_id(wrapped)))
        .unwrap_or(0)
}

/// Errors surfaced while building or mutating computation indices.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum IndexError {
    #[error("duplicate instruction id %{}", .instruction.0)]
    DuplicateInstruction { instruction: InstrId },
    #[error("instruction %{} uses operand %{} before it is defined", .user.0, .operand.0)]
    UndefinedOperand { user: InstrId, operand: InstrId },
    #[error("root %{} is not defined in the computation", .root.0)]
    UndefinedRoot { root: InstrId },
    #[error("unknown instruction id %{}", .instruction.0)]
    UnknownInstruction { instruction: InstrId },
}
