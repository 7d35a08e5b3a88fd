use crate::index::{ComputationIndices, IndexError};
use crate::spec::{Computation, ExecutionThread, InstrId, Instruction, Opcode, Operation, ValueType};

/// Mutable computation editor with stable instruction identifiers.
///
/// The rewriter keeps the positional and use-def indices in sync with the
/// instruction arena across insertions, detachments, and use redirection.
pub struct ComputationRewriter<'a> {
    pub computation: &'a mut Computation,
    indices: ComputationIndices,
}

impl<'a> ComputationRewriter<'a> {
    /// Creates a rewriter for the computation, indexing and verifying its body.
    pub fn new(computation: &'a mut Computation) -> Result<Self, IndexError> {
        let indices = ComputationIndices::build(computation)?;
        Ok(Self {
            computation,
            indices,
        })
    }

    pub fn contains(&self, id: InstrId) -> bool {
        self.indices.contains(id)
    }

    /// Returns the arena position of the instruction.
    pub fn position(&self, id: InstrId) -> Result<usize, IndexError> {
        self.indices
            .position(id)
            .ok_or(IndexError::UnknownInstruction { instruction: id })
    }

    pub fn instruction(&self, id: InstrId) -> Result<&Instruction, IndexError> {
        let pos = self.position(id)?;
        Ok(&self.computation.body[pos])
    }

    pub fn opcode(&self, id: InstrId) -> Result<Opcode, IndexError> {
        Ok(self.instruction(id)?.opcode())
    }

    pub fn operands(&self, id: InstrId) -> Result<&[InstrId], IndexError> {
        Ok(self.instruction(id)?.operands.as_slice())
    }

    /// Returns the recorded consumers of the instruction's value.
    pub fn users_of(&self, id: InstrId) -> &[InstrId] {
        self.indices.users_of(id)
    }

    pub fn root_id(&self) -> InstrId {
        self.computation.root_id
    }

    pub fn is_root(&self, id: InstrId) -> bool {
        self.computation.root_id == id
    }

    pub fn insts_in_order(&self) -> Vec<InstrId> {
        self.indices.ordered_ids()
    }

    /// Detaches the instruction from the arena, returning its former position
    /// and the instruction itself.
    ///
    /// The recorded consumers of its value are kept so they can still be
    /// redirected with [`Self::redirect_uses`] after the detach.
    pub fn take(&mut self, id: InstrId) -> Result<(usize, Instruction), IndexError> {
        let pos = self.position(id)?;
        let instruction = self.computation.body.remove(pos);
        self.indices.detach_instruction(&instruction);
        Ok((pos, instruction))
    }

    /// Inserts a freshly built instruction at the given arena position and
    /// returns its identifier.
    #[allow(clippy::too_many_arguments)]
    pub fn insert_at(
        &mut self,
        pos: usize,
        name: impl Into<String>,
        op: Operation,
        operands: Vec<InstrId>,
        output: ValueType,
        backend_config: Option<String>,
        execution_thread: ExecutionThread,
    ) -> Result<InstrId, IndexError> {
        let id = self.indices.allocate_id();
        let instruction = Instruction {
            id,
            name: name.into(),
            op,
            operands,
            output,
            backend_config,
            execution_thread,
        };
        self.computation.body.insert(pos, instruction);
        self.indices
            .insert_instruction(pos, &self.computation.body[pos])?;
        Ok(id)
    }

    /// Replaces all uses of `from` with `to` in consumer operand lists.
    pub fn redirect_uses(&mut self, from: InstrId, to: InstrId) -> Result<(), IndexError> {
        if from == to {
            return Ok(());
        }
        let consumers = self.indices.users_of(from).to_vec();
        for consumer in consumers {
            let pos = self.position(consumer)?;
            for operand in &mut self.computation.body[pos].operands {
                if *operand == from {
                    *operand = to;
                }
            }
        }
        self.indices.redirect_uses(from, to);
        Ok(())
    }

    /// Re-designates the computation root.
    pub fn set_root(&mut self, id: InstrId) -> Result<(), IndexError> {
        if !self.indices.contains(id) {
            return Err(IndexError::UnknownInstruction { instruction: id });
        }
        self.computation.root_id = id;
        Ok(())
    }

    /// Verifies structural invariants after mutations.
    pub fn verify(&self) -> bool {
        ComputationIndices::build(self.computation).is_ok()
    }
}
