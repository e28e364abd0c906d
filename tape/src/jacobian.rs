use descent_core::config::{
    CHECK_JACOBIAN_IS_ZERO, CHECK_TAPE_ACTIVITY, CHECK_ZERO_INDEX, DEFAULT_CHUNK_SIZE,
    DEFAULT_SMALL_CHUNK_SIZE, IGNORE_INVALID_JACOBIANS, SKIP_ZERO_ADJOINT,
};
use descent_core::{
    Gradient, Identifier, MAX_STATEMENT_ARGS, PASSIVE_INDEX, Real, StatementArgs,
    input_statement_tag,
};
use descent_expr::{AdKind, ExprNode, PartialsSink};
use tracing::{debug, trace_span};

use crate::adjoints::AdjointVector;
use crate::chunks::{ChunkedLog, ForwardCursor, LogKind, LogPosition, ReverseCursor};
use crate::errors::{TapeError, escalate_allocation};
use crate::external::{ExternalEntry, ExternalFunctionRecord, GradientAccess};
use crate::indices::IndexManager;
use crate::interface::ReverseTape;
use crate::stats::{LogStatistics, TapeStatistics};

// RECORDS
// ================================================================================================

/// One statement: the left-hand identifier and the number of Jacobian
/// entries it owns. The argument count [`input_statement_tag`] marks an
/// independent-variable registration, which owns no entries.
#[derive(Clone, Copy, Debug)]
struct StatementEntry {
    lhs: Identifier,
    args: StatementArgs,
}

/// One pre-multiplied partial derivative and the operand it belongs to.
#[derive(Clone, Copy, Debug)]
struct JacobianEntry<R> {
    partial: R,
    operand: Identifier,
}

// POSITION
// ================================================================================================

/// Snapshot of every log of a [`JacobianTape`], ordered lexicographically
/// from the outermost log inward.
#[derive(Clone, Copy, Debug, PartialEq, PartialOrd)]
pub struct JacobianPosition<MP> {
    externals: LogPosition,
    statements: LogPosition,
    jacobians: LogPosition,
    manager: MP,
}

/// Inner-log positions pinned by an external-function record.
#[derive(Clone, Copy, Debug)]
struct JacobianInner {
    statements: LogPosition,
    jacobians: LogPosition,
}

// JACOBIAN ROW SINK
// ================================================================================================

/// Writes the Jacobian row of one statement, applying the recording gates.
struct RowSink<'a, K: AdKind> {
    log: &'a mut ChunkedLog<JacobianEntry<K::Real>>,
    count: StatementArgs,
}

impl<K: AdKind<Data = Identifier>> PartialsSink<K> for RowSink<'_, K> {
    #[inline(always)]
    fn push(&mut self, jacobian: K::Real, _value: K::Real, data: &Identifier) {
        if CHECK_ZERO_INDEX && *data == PASSIVE_INDEX {
            return;
        }
        if IGNORE_INVALID_JACOBIANS && !jacobian.is_finite() {
            return;
        }
        if CHECK_JACOBIAN_IS_ZERO && jacobian == <K::Real as Real>::ZERO {
            return;
        }
        self.log.push(JacobianEntry { partial: jacobian, operand: *data });
        self.count += 1;
    }
}

// JACOBIAN TAPE
// ================================================================================================

/// A tape storing pre-multiplied local partial derivatives per statement.
///
/// Recording extracts the Jacobian row of every assigned expression, so
/// reverse sweeps are a pure multiply-accumulate scan with no primal
/// recomputation. The index manager `M` decides identifier lifetime: the
/// linear manager pairs naturally with this tape and aliases identifiers on
/// copy assignments; the reuse managers recycle them.
pub struct JacobianTape<R: Real, G: Gradient<R>, M: IndexManager> {
    statements: ChunkedLog<StatementEntry>,
    jacobians: ChunkedLog<JacobianEntry<R>>,
    externals: ChunkedLog<ExternalEntry<R, JacobianInner>>,
    adjoints: AdjointVector<G>,
    manager: M,
    manager_zero: M::Position,
    active: bool,
}

impl<R: Real, G: Gradient<R>, M: IndexManager> JacobianTape<R, G, M> {
    /// Reverse sweep from `from` down to `to` against a caller-supplied
    /// adjoint buffer.
    ///
    /// The buffer is borrowed for the duration of the sweep; the tape's own
    /// adjoint vector is untouched.
    pub fn evaluate_with(
        &mut self,
        from: JacobianPosition<M::Position>,
        to: JacobianPosition<M::Position>,
        adjoints: &mut AdjointVector<G>,
    ) -> Result<(), TapeError> {
        if self.active {
            return Err(TapeError::EvaluateWhileRecording);
        }
        if !(from >= to) {
            return Err(TapeError::PositionOrder);
        }
        let _span = trace_span!("evaluate_reverse").entered();

        adjoints.ensure(self.manager.max_live());
        let Self { statements, jacobians, externals, .. } = self;

        let mut statement_cursor = from.statements;
        let mut row_cursor = jacobians.reverse_cursor(from.jacobians);
        let mut external_pos = from.externals;

        while external_pos > to.externals {
            external_pos = externals.prev_position(external_pos);
            let inner = externals.get(external_pos.chunk, external_pos.offset).inner;

            Self::sweep_reverse(
                statements,
                jacobians,
                adjoints,
                statement_cursor,
                inner.statements,
                &mut row_cursor,
            );
            statement_cursor = inner.statements;

            let entry = externals.get_mut(external_pos.chunk, external_pos.offset);
            let mut access = GradientAccess::new(adjoints);
            entry.record.call_reverse(&mut access)?;
        }

        Self::sweep_reverse(
            statements,
            jacobians,
            adjoints,
            statement_cursor,
            to.statements,
            &mut row_cursor,
        );
        Ok(())
    }

    /// Forward sweep from `to` up to `from` against a caller-supplied
    /// tangent buffer.
    pub fn evaluate_forward_with(
        &mut self,
        from: JacobianPosition<M::Position>,
        to: JacobianPosition<M::Position>,
        adjoints: &mut AdjointVector<G>,
    ) -> Result<(), TapeError> {
        if self.active {
            return Err(TapeError::EvaluateWhileRecording);
        }
        if !(from >= to) {
            return Err(TapeError::PositionOrder);
        }
        let _span = trace_span!("evaluate_forward").entered();

        adjoints.ensure(self.manager.max_live());
        let Self { statements, jacobians, externals, .. } = self;

        let mut statement_cursor = to.statements;
        let mut row_cursor = jacobians.forward_cursor(to.jacobians);
        let mut external_pos = to.externals;

        loop {
            // normalize the cursor onto the next stored entry
            if external_pos.offset >= externals.chunk_len(external_pos.chunk)
                && external_pos.chunk < from.externals.chunk
            {
                external_pos = LogPosition::new(external_pos.chunk + 1, 0);
            }
            if !(external_pos < from.externals) {
                break;
            }

            let inner = externals.get(external_pos.chunk, external_pos.offset).inner;
            Self::sweep_forward(
                statements,
                jacobians,
                adjoints,
                statement_cursor,
                inner.statements,
                &mut row_cursor,
            );
            statement_cursor = inner.statements;

            let entry = externals.get_mut(external_pos.chunk, external_pos.offset);
            let mut access = GradientAccess::new(adjoints);
            entry.record.call_forward(&mut access)?;

            external_pos = LogPosition::new(external_pos.chunk, external_pos.offset + 1);
        }

        Self::sweep_forward(
            statements,
            jacobians,
            adjoints,
            statement_cursor,
            from.statements,
            &mut row_cursor,
        );
        Ok(())
    }

    /// Returns a tape with the given chunk sizes for the data-heavy and the
    /// short logs.
    pub fn with_chunk_sizes(data_chunk_size: usize, small_chunk_size: usize) -> Self {
        let manager = M::new(0);
        let manager_zero = manager.position();
        Self {
            statements: ChunkedLog::new(LogKind::Statements, small_chunk_size),
            jacobians: ChunkedLog::new(LogKind::Jacobians, data_chunk_size),
            externals: ChunkedLog::new(LogKind::ExternalFunctions, small_chunk_size),
            adjoints: AdjointVector::new(),
            manager,
            manager_zero,
            active: false,
        }
    }

    // SWEEP LOOPS
    // --------------------------------------------------------------------------------------------

    fn sweep_reverse(
        statements: &ChunkedLog<StatementEntry>,
        jacobians: &ChunkedLog<JacobianEntry<R>>,
        adjoints: &mut AdjointVector<G>,
        from: LogPosition,
        to: LogPosition,
        row_cursor: &mut ReverseCursor,
    ) {
        statements.for_each_reverse(from, to, |statement| {
            if statement.args == input_statement_tag() {
                return;
            }

            let adjoint = adjoints.get(statement.lhs);
            adjoints.set(statement.lhs, G::zero());

            // the row must be consumed even when the adjoint is zero
            let row = jacobians.take_back(row_cursor, statement.args as usize);
            if SKIP_ZERO_ADJOINT && adjoint.is_zero() {
                return;
            }
            for entry in row {
                adjoints.accumulate(entry.operand, adjoint.scaled(entry.partial));
            }
        });
    }

    fn sweep_forward(
        statements: &ChunkedLog<StatementEntry>,
        jacobians: &ChunkedLog<JacobianEntry<R>>,
        adjoints: &mut AdjointVector<G>,
        from: LogPosition,
        to: LogPosition,
        row_cursor: &mut ForwardCursor,
    ) {
        statements.for_each_forward(from, to, |statement| {
            if statement.args == input_statement_tag() {
                return;
            }

            let row = jacobians.take_front(row_cursor, statement.args as usize);
            let mut tangent = G::zero();
            for entry in row {
                tangent += adjoints.get(entry.operand).scaled(entry.partial);
            }
            adjoints.set(statement.lhs, tangent);
        });
    }
}

impl<R: Real, G: Gradient<R>, M: IndexManager> ReverseTape for JacobianTape<R, G, M> {
    type Real = R;
    type Gradient = G;
    type Position = JacobianPosition<M::Position>;

    const STORES_PRIMALS: bool = false;
    const ALLOW_JACOBIAN_OPTIMIZATION: bool = true;

    fn new() -> Self {
        Self::with_chunk_sizes(DEFAULT_CHUNK_SIZE, DEFAULT_SMALL_CHUNK_SIZE)
    }

    // ACTIVITY
    // --------------------------------------------------------------------------------------------

    fn set_active(&mut self) {
        self.active = true;
    }

    fn set_passive(&mut self) {
        self.active = false;
    }

    fn is_active(&self) -> bool {
        self.active
    }

    // RECORDING
    // --------------------------------------------------------------------------------------------

    fn store_expr<E>(&mut self, lhs_value: &mut R, lhs_id: &mut Identifier, rhs: &E)
    where
        E: ExprNode,
        E::Kind: AdKind<Real = R, Data = Identifier>,
    {
        if CHECK_TAPE_ACTIVITY && !self.active {
            self.manager.free(lhs_id);
            *lhs_value = rhs.value();
            return;
        }

        debug_assert!(E::MAX_ACTIVE <= MAX_STATEMENT_ARGS);
        self.statements.reserve(1).unwrap_or_else(|err| escalate_allocation(err));
        self.jacobians.reserve(E::MAX_ACTIVE).unwrap_or_else(|err| escalate_allocation(err));

        let mut sink = RowSink::<E::Kind> { log: &mut self.jacobians, count: 0 };
        rhs.push_partials(&mut sink, R::ONE);
        let args = sink.count;

        if args > 0 {
            self.manager.assign(lhs_id);
            self.statements.push(StatementEntry { lhs: *lhs_id, args });
        } else {
            self.manager.free(lhs_id);
        }
        *lhs_value = rhs.value();
    }

    fn store_copy(
        &mut self,
        lhs_value: &mut R,
        lhs_id: &mut Identifier,
        rhs_value: R,
        rhs_id: Identifier,
    ) {
        if (CHECK_TAPE_ACTIVITY && !self.active)
            || (CHECK_ZERO_INDEX && rhs_id == PASSIVE_INDEX)
        {
            self.manager.free(lhs_id);
        } else if M::ASSIGN_NEEDS_STATEMENT {
            // single-owner identifiers: a copy is a one-term identity statement
            self.statements.reserve(1).unwrap_or_else(|err| escalate_allocation(err));
            self.jacobians.reserve(1).unwrap_or_else(|err| escalate_allocation(err));
            self.jacobians.push(JacobianEntry { partial: R::ONE, operand: rhs_id });
            self.manager.assign(lhs_id);
            self.statements.push(StatementEntry { lhs: *lhs_id, args: 1 });
        } else {
            self.manager.copy_assign(lhs_id, rhs_id);
        }
        *lhs_value = rhs_value;
    }

    fn store_passive(&mut self, lhs_value: &mut R, lhs_id: &mut Identifier, rhs: R) {
        self.manager.free(lhs_id);
        *lhs_value = rhs;
    }

    fn free_identifier(&mut self, id: &mut Identifier) {
        self.manager.free(id);
    }

    // REGISTRATION
    // --------------------------------------------------------------------------------------------

    fn register_input_id(&mut self, _value: R, id: &mut Identifier) {
        self.statements.reserve(1).unwrap_or_else(|err| escalate_allocation(err));
        if *id != PASSIVE_INDEX {
            self.manager.free(id);
        }
        *id = self.manager.create_unused();
        self.statements.push(StatementEntry { lhs: *id, args: input_statement_tag() });
    }

    fn register_output_id(&mut self, _value: R, id: &mut Identifier) {
        if *id == PASSIVE_INDEX {
            return;
        }
        // the reuse manager without use counts records every copy anyway, so
        // the identifier is already exclusive
        if M::IS_LINEAR || !M::ASSIGN_NEEDS_STATEMENT {
            self.statements.reserve(1).unwrap_or_else(|err| escalate_allocation(err));
            self.jacobians.reserve(1).unwrap_or_else(|err| escalate_allocation(err));
            self.jacobians.push(JacobianEntry { partial: R::ONE, operand: *id });
            self.manager.assign(id);
            self.statements.push(StatementEntry { lhs: *id, args: 1 });
        }
    }

    fn register_external_output_id(&mut self, value: R, id: &mut Identifier) -> R {
        // external outputs become independent variables: their adjoints are
        // consumed by the record's callback, not by the statement sweep
        self.register_input_id(value, id);
        R::ZERO
    }

    // GRADIENT ACCESS
    // --------------------------------------------------------------------------------------------

    fn gradient_at(&self, id: Identifier) -> G {
        self.adjoints.get(id)
    }

    fn set_gradient_at(&mut self, id: Identifier, gradient: G) {
        self.adjoints.set(id, gradient);
    }

    fn clear_adjoints(&mut self) {
        self.adjoints.clear();
    }

    // POSITIONS AND TRUNCATION
    // --------------------------------------------------------------------------------------------

    fn position(&self) -> Self::Position {
        JacobianPosition {
            externals: self.externals.position(),
            statements: self.statements.position(),
            jacobians: self.jacobians.position(),
            manager: self.manager.position(),
        }
    }

    fn zero_position(&self) -> Self::Position {
        JacobianPosition {
            externals: LogPosition::default(),
            statements: LogPosition::default(),
            jacobians: LogPosition::default(),
            manager: self.manager_zero,
        }
    }

    fn reset_to(&mut self, pos: Self::Position) {
        let dropped = self.externals.len_between(self.externals.position(), pos.externals);
        if dropped > 0 {
            debug!(dropped_external_functions = dropped, "truncating tape");
        }
        self.externals.reset_to(pos.externals);
        self.statements.reset_to(pos.statements);
        self.jacobians.reset_to(pos.jacobians);
        self.manager.reset_to(pos.manager);
        self.adjoints.clear();
    }

    fn reset(&mut self) {
        let zero = self.zero_position();
        self.reset_to(zero);
        self.manager.reset();
    }

    // EVALUATION
    // --------------------------------------------------------------------------------------------

    fn evaluate_between(&mut self, from: Self::Position, to: Self::Position)
        -> Result<(), TapeError>
    {
        let mut adjoints = core::mem::take(&mut self.adjoints);
        let result = self.evaluate_with(from, to, &mut adjoints);
        self.adjoints = adjoints;
        result
    }

    fn evaluate_forward_between(
        &mut self,
        from: Self::Position,
        to: Self::Position,
    ) -> Result<(), TapeError> {
        let mut adjoints = core::mem::take(&mut self.adjoints);
        let result = self.evaluate_forward_with(from, to, &mut adjoints);
        self.adjoints = adjoints;
        result
    }

    // EXTERNAL FUNCTIONS
    // --------------------------------------------------------------------------------------------

    fn push_external_function(
        &mut self,
        record: ExternalFunctionRecord<R>,
    ) -> Result<(), TapeError> {
        self.externals.reserve(1)?;
        let inner = JacobianInner {
            statements: self.statements.position(),
            jacobians: self.jacobians.position(),
        };
        self.externals.push(ExternalEntry { record, inner });
        Ok(())
    }

    // INSPECTION
    // --------------------------------------------------------------------------------------------

    fn statistics(&self) -> TapeStatistics {
        TapeStatistics {
            tape_name: "JacobianTape",
            active: self.active,
            statements: LogStatistics::of(&self.statements),
            operand_data: LogStatistics::of(&self.jacobians),
            constants: None,
            external_functions: self.externals.len(),
            adjoint_slots: self.adjoints.len(),
            adjoint_bytes: self.adjoints.allocated_bytes(),
            primal_slots: None,
            max_live_identifier: self.manager.max_live(),
            free_identifiers: self.manager.free_count(),
        }
    }
}
