use core::marker::PhantomData;

use descent_core::config::{
    CHECK_TAPE_ACTIVITY, CHECK_ZERO_INDEX, DEFAULT_CHUNK_SIZE, DEFAULT_SMALL_CHUNK_SIZE,
    SKIP_ZERO_ADJOINT,
};
use descent_core::{
    Gradient, Identifier, MAX_STATEMENT_ARGS, PASSIVE_INDEX, Real, StatementArgs,
    input_statement_tag,
};
use descent_expr::{AdKind, ConstantSink, ExprNode, LeafSink};
use tracing::{debug, trace_span};

use crate::adjoints::AdjointVector;
use crate::chunks::{ChunkedLog, ForwardCursor, LogKind, LogPosition, ReverseCursor};
use crate::errors::{TapeError, escalate_allocation};
use crate::external::{ExternalEntry, ExternalFunctionRecord, PrimalGradientAccess};
use crate::indices::IndexManager;
use crate::interface::ReverseTape;
use crate::stats::{LogStatistics, TapeStatistics};

// STATEMENT HANDLES
// ================================================================================================

type PrimalFn<R> = fn(&[Identifier], &mut usize, &[R], &mut usize, &[R]) -> R;
type AdjointFn<R, G> = fn(G, &[Identifier], &mut usize, &[R], &mut usize, &[R], &mut [G]);
type TangentFn<R, G> = fn(&[Identifier], &mut usize, &[R], &mut usize, &[R], &[G]) -> (R, G);

/// The precomputed evaluation functions of one expression shape.
///
/// A handle exists once per shape (per monomorphization), not once per
/// recorded statement; statements store a reference to it together with their
/// operand streams.
pub struct StatementHandle<R: Real, G: Gradient<R>> {
    primal: PrimalFn<R>,
    adjoint: AdjointFn<R, G>,
    tangent: TangentFn<R, G>,
    max_active: StatementArgs,
    max_constants: StatementArgs,
}

/// Per-shape storage: referencing the associated constant promotes it to a
/// `'static` slot for each `(shape, gradient)` instantiation.
struct HandleStore<E, G>(PhantomData<(E, G)>);

impl<E, G> HandleStore<E, G>
where
    E: ExprNode,
    G: Gradient<<E::Kind as AdKind>::Real>,
{
    const HANDLE: StatementHandle<<E::Kind as AdKind>::Real, G> = StatementHandle {
        primal: E::replay_primal,
        adjoint: E::replay_adjoint::<G>,
        tangent: E::replay_tangent::<G>,
        max_active: E::MAX_ACTIVE as StatementArgs,
        max_constants: E::MAX_CONSTANTS as StatementArgs,
    };
}

fn handle_of<E, G>() -> &'static StatementHandle<<E::Kind as AdKind>::Real, G>
where
    E: ExprNode,
    G: Gradient<<E::Kind as AdKind>::Real>,
{
    &HandleStore::<E, G>::HANDLE
}

// input statements restore primals but propagate nothing

fn input_primal<R: Real>(
    _ids: &[Identifier],
    _ipos: &mut usize,
    _constants: &[R],
    _cpos: &mut usize,
    _primals: &[R],
) -> R {
    R::ZERO
}

fn input_adjoint<R: Real, G: Gradient<R>>(
    _seed: G,
    _ids: &[Identifier],
    _ipos: &mut usize,
    _constants: &[R],
    _cpos: &mut usize,
    _primals: &[R],
    _adjoints: &mut [G],
) {
}

fn input_tangent<R: Real, G: Gradient<R>>(
    _ids: &[Identifier],
    _ipos: &mut usize,
    _constants: &[R],
    _cpos: &mut usize,
    _primals: &[R],
    _tangents: &[G],
) -> (R, G) {
    (R::ZERO, G::zero())
}

fn copy_primal<R: Real>(
    ids: &[Identifier],
    ipos: &mut usize,
    _constants: &[R],
    _cpos: &mut usize,
    primals: &[R],
) -> R {
    let id = ids[*ipos] as usize;
    *ipos += 1;
    primals[id]
}

fn copy_adjoint<R: Real, G: Gradient<R>>(
    seed: G,
    ids: &[Identifier],
    ipos: &mut usize,
    _constants: &[R],
    _cpos: &mut usize,
    _primals: &[R],
    adjoints: &mut [G],
) {
    let id = ids[*ipos] as usize;
    *ipos += 1;
    adjoints[id] += seed;
}

fn copy_tangent<R: Real, G: Gradient<R>>(
    ids: &[Identifier],
    ipos: &mut usize,
    _constants: &[R],
    _cpos: &mut usize,
    primals: &[R],
    tangents: &[G],
) -> (R, G) {
    let id = ids[*ipos] as usize;
    *ipos += 1;
    (primals[id], tangents[id])
}

impl<R: Real, G: Gradient<R>> StatementHandle<R, G> {
    const INPUT: Self = Self {
        primal: input_primal::<R>,
        adjoint: input_adjoint::<R, G>,
        tangent: input_tangent::<R, G>,
        max_active: 0,
        max_constants: 0,
    };

    const COPY: Self = Self {
        primal: copy_primal::<R>,
        adjoint: copy_adjoint::<R, G>,
        tangent: copy_tangent::<R, G>,
        max_active: 1,
        max_constants: 0,
    };

    fn input() -> &'static Self {
        &Self::INPUT
    }

    fn copy() -> &'static Self {
        &Self::COPY
    }
}

// RECORDS
// ================================================================================================

/// One statement: the left-hand identifier, the primal it overwrote, the
/// shape handle, and the number of passive operands promoted into the
/// reserved low identifiers. [`input_statement_tag`] in the promoted count
/// marks an independent-variable registration.
#[derive(Clone, Copy)]
struct PrimalStatement<R: Real, G: Gradient<R>> {
    lhs: Identifier,
    old_primal: R,
    handle: &'static StatementHandle<R, G>,
    promoted: StatementArgs,
}

// POSITION
// ================================================================================================

/// Snapshot of every log of a [`PrimalValueTape`], ordered lexicographically
/// from the outermost log inward.
#[derive(Clone, Copy, Debug, PartialEq, PartialOrd)]
pub struct PrimalPosition<MP> {
    externals: LogPosition,
    statements: LogPosition,
    identifiers: LogPosition,
    constants: LogPosition,
    manager: MP,
}

/// Inner-log positions pinned by an external-function record.
#[derive(Clone, Copy, Debug)]
struct PrimalInner {
    statements: LogPosition,
    identifiers: LogPosition,
    constants: LogPosition,
}

// OPERAND SINKS
// ================================================================================================

struct ConstSink<'a, R: Real> {
    constants: &'a mut ChunkedLog<R>,
    count: usize,
}

impl<R: Real> ConstantSink<R> for ConstSink<'_, R> {
    #[inline(always)]
    fn push_constant(&mut self, value: R) {
        self.constants.push(value);
        self.count += 1;
    }
}

/// Pushes the leaf identifiers of a statement; a passive leaf is promoted to
/// the next reserved low identifier and its value is appended to the
/// constant stream.
struct OperandSink<'a, R: Real> {
    identifiers: &'a mut ChunkedLog<Identifier>,
    constants: &'a mut ChunkedLog<R>,
    promoted: StatementArgs,
}

impl<R: Real> LeafSink<R> for OperandSink<'_, R> {
    #[inline(always)]
    fn push_leaf(&mut self, value: R, id: Identifier) {
        if id == PASSIVE_INDEX {
            self.promoted += 1;
            self.constants.push(value);
            self.identifiers.push(self.promoted as Identifier);
        } else {
            self.identifiers.push(id);
        }
    }
}

// PRIMAL VALUE TAPE
// ================================================================================================

/// A tape storing expression handles and operand identifiers instead of
/// pre-multiplied partials.
///
/// Statements are replayed during sweeps from a primal vector indexed by
/// identifier. Each statement preserves the primal it overwrote, so reverse
/// sweeps can roll the vector back as they walk and stay correct when the
/// index manager reuses identifiers; the sweep operates on a working copy so
/// the recorded state survives repeated evaluations.
pub struct PrimalValueTape<R: Real, G: Gradient<R>, M: IndexManager> {
    statements: ChunkedLog<PrimalStatement<R, G>>,
    identifiers: ChunkedLog<Identifier>,
    constants: ChunkedLog<R>,
    externals: ChunkedLog<ExternalEntry<R, PrimalInner>>,
    primals: Vec<R>,
    adjoints: AdjointVector<G>,
    manager: M,
    manager_zero: M::Position,
    active: bool,
}

impl<R: Real, G: Gradient<R>, M: IndexManager> PrimalValueTape<R, G, M> {
    /// Returns a tape with the given chunk sizes for the data-heavy and the
    /// short logs.
    pub fn with_chunk_sizes(data_chunk_size: usize, small_chunk_size: usize) -> Self {
        let manager = M::new(MAX_STATEMENT_ARGS as Identifier);
        let manager_zero = manager.position();
        Self {
            statements: ChunkedLog::new(LogKind::Statements, small_chunk_size),
            identifiers: ChunkedLog::new(LogKind::Identifiers, data_chunk_size),
            constants: ChunkedLog::new(LogKind::Constants, data_chunk_size),
            externals: ChunkedLog::new(LogKind::ExternalFunctions, small_chunk_size),
            primals: Vec::new(),
            adjoints: AdjointVector::new(),
            manager,
            manager_zero,
            active: false,
        }
    }

    // PRIMAL VECTOR ACCESS
    // --------------------------------------------------------------------------------------------

    /// Reads the primal stored under an identifier.
    pub fn primal(&self, id: Identifier) -> R {
        self.primals.get(id as usize).copied().unwrap_or(R::ZERO)
    }

    /// Overwrites the primal stored under an identifier; a subsequent
    /// `evaluate_primal` or forward sweep recomputes everything downstream.
    pub fn set_primal(&mut self, id: Identifier, value: R) {
        self.ensure_primals();
        self.primals[id as usize] = value;
    }

    fn ensure_primals(&mut self) {
        let needed = self.manager.max_live() as usize + 1;
        if self.primals.len() < needed {
            let target = needed.max(self.primals.len() * 2).max(MAX_STATEMENT_ARGS + 1);
            self.primals.resize(target, R::ZERO);
        }
    }

    // STATEMENT HELPERS
    // --------------------------------------------------------------------------------------------

    fn push_input_statement(&mut self, value: R, id: &mut Identifier, unused: bool) -> R {
        self.statements.reserve(1).unwrap_or_else(|err| escalate_allocation(err));
        if unused {
            if *id != PASSIVE_INDEX {
                self.manager.free(id);
            }
            *id = self.manager.create_unused();
        } else {
            self.manager.assign(id);
        }
        self.ensure_primals();
        let old_primal = self.primals[*id as usize];
        self.statements.push(PrimalStatement {
            lhs: *id,
            old_primal,
            handle: StatementHandle::input(),
            promoted: input_statement_tag(),
        });
        self.primals[*id as usize] = value;
        old_primal
    }

    fn push_copy_statement(&mut self, rhs_value: R, lhs_id: &mut Identifier, rhs_id: Identifier) {
        self.statements.reserve(1).unwrap_or_else(|err| escalate_allocation(err));
        self.identifiers.reserve(1).unwrap_or_else(|err| escalate_allocation(err));
        self.identifiers.push(rhs_id);
        self.manager.assign(lhs_id);
        self.ensure_primals();
        let old_primal = self.primals[*lhs_id as usize];
        self.statements.push(PrimalStatement {
            lhs: *lhs_id,
            old_primal,
            handle: StatementHandle::copy(),
            promoted: 0,
        });
        self.primals[*lhs_id as usize] = rhs_value;
    }

    // SWEEP LOOPS
    // --------------------------------------------------------------------------------------------

    #[allow(clippy::too_many_arguments)]
    fn sweep_reverse(
        statements: &ChunkedLog<PrimalStatement<R, G>>,
        identifiers: &ChunkedLog<Identifier>,
        constants: &ChunkedLog<R>,
        working: &mut [R],
        adjoints: &mut AdjointVector<G>,
        from: LogPosition,
        to: LogPosition,
        id_cursor: &mut ReverseCursor,
        const_cursor: &mut ReverseCursor,
    ) {
        statements.for_each_reverse(from, to, |statement| {
            // roll the primal vector back before touching the partials; a
            // self-referential statement must see its pre-assignment operand
            working[statement.lhs as usize] = statement.old_primal;

            if statement.promoted == input_statement_tag() {
                return;
            }

            let adjoint = adjoints.get(statement.lhs);
            adjoints.set(statement.lhs, G::zero());

            let promoted = constants.take_back(const_cursor, statement.promoted as usize);
            for (slot, value) in promoted.iter().enumerate() {
                working[slot + 1] = *value;
            }
            let handle = statement.handle;
            let op_constants = constants.take_back(const_cursor, handle.max_constants as usize);
            let ids = identifiers.take_back(id_cursor, handle.max_active as usize);

            if SKIP_ZERO_ADJOINT && adjoint.is_zero() {
                return;
            }
            let (mut ipos, mut cpos) = (0, 0);
            (handle.adjoint)(
                adjoint,
                ids,
                &mut ipos,
                op_constants,
                &mut cpos,
                working,
                adjoints.as_mut_slice(),
            );
        });
    }

    #[allow(clippy::too_many_arguments)]
    fn sweep_forward(
        statements: &ChunkedLog<PrimalStatement<R, G>>,
        identifiers: &ChunkedLog<Identifier>,
        constants: &ChunkedLog<R>,
        primals: &mut [R],
        adjoints: &mut AdjointVector<G>,
        from: LogPosition,
        to: LogPosition,
        id_cursor: &mut ForwardCursor,
        const_cursor: &mut ForwardCursor,
    ) {
        statements.for_each_forward(from, to, |statement| {
            if statement.promoted == input_statement_tag() {
                return;
            }

            let handle = statement.handle;
            let op_constants = constants.take_front(const_cursor, handle.max_constants as usize);
            let promoted = constants.take_front(const_cursor, statement.promoted as usize);
            for (slot, value) in promoted.iter().enumerate() {
                primals[slot + 1] = *value;
            }
            let ids = identifiers.take_front(id_cursor, handle.max_active as usize);

            let (mut ipos, mut cpos) = (0, 0);
            let (value, tangent) = (handle.tangent)(
                ids,
                &mut ipos,
                op_constants,
                &mut cpos,
                primals,
                adjoints.as_slice(),
            );
            primals[statement.lhs as usize] = value;
            adjoints.set(statement.lhs, tangent);
        });
    }

    fn sweep_primal(
        statements: &ChunkedLog<PrimalStatement<R, G>>,
        identifiers: &ChunkedLog<Identifier>,
        constants: &ChunkedLog<R>,
        primals: &mut [R],
        from: LogPosition,
        to: LogPosition,
        id_cursor: &mut ForwardCursor,
        const_cursor: &mut ForwardCursor,
    ) {
        statements.for_each_forward(from, to, |statement| {
            if statement.promoted == input_statement_tag() {
                return;
            }

            let handle = statement.handle;
            let op_constants = constants.take_front(const_cursor, handle.max_constants as usize);
            let promoted = constants.take_front(const_cursor, statement.promoted as usize);
            for (slot, value) in promoted.iter().enumerate() {
                primals[slot + 1] = *value;
            }
            let ids = identifiers.take_front(id_cursor, handle.max_active as usize);

            let (mut ipos, mut cpos) = (0, 0);
            let value =
                (handle.primal)(ids, &mut ipos, op_constants, &mut cpos, primals);
            primals[statement.lhs as usize] = value;
        });
    }

    // EVALUATION AGAINST A CALLER-SUPPLIED BUFFER
    // --------------------------------------------------------------------------------------------

    /// Reverse sweep from `from` down to `to` against a caller-supplied
    /// adjoint buffer.
    pub fn evaluate_with(
        &mut self,
        from: PrimalPosition<M::Position>,
        to: PrimalPosition<M::Position>,
        adjoints: &mut AdjointVector<G>,
    ) -> Result<(), TapeError> {
        if self.active {
            return Err(TapeError::EvaluateWhileRecording);
        }
        if !(from >= to) {
            return Err(TapeError::PositionOrder);
        }
        let _span = trace_span!("evaluate_reverse").entered();

        self.ensure_primals();
        adjoints.ensure(self.manager.max_live());

        // the sweep rolls primals back as it walks; run it on a copy so the
        // recorded state survives repeated evaluations
        let mut working = self.primals.clone();
        let Self { statements, identifiers, constants, externals, .. } = self;

        let mut statement_cursor = from.statements;
        let mut id_cursor = identifiers.reverse_cursor(from.identifiers);
        let mut const_cursor = constants.reverse_cursor(from.constants);
        let mut external_pos = from.externals;

        while external_pos > to.externals {
            external_pos = externals.prev_position(external_pos);
            let inner = externals.get(external_pos.chunk, external_pos.offset).inner;

            Self::sweep_reverse(
                statements,
                identifiers,
                constants,
                &mut working,
                adjoints,
                statement_cursor,
                inner.statements,
                &mut id_cursor,
                &mut const_cursor,
            );
            statement_cursor = inner.statements;

            let entry = externals.get_mut(external_pos.chunk, external_pos.offset);
            let mut access = PrimalGradientAccess::new(adjoints, &mut working);
            entry.record.call_reverse(&mut access)?;
        }

        Self::sweep_reverse(
            statements,
            identifiers,
            constants,
            &mut working,
            adjoints,
            statement_cursor,
            to.statements,
            &mut id_cursor,
            &mut const_cursor,
        );
        Ok(())
    }

    /// Forward sweep from `to` up to `from` against a caller-supplied
    /// tangent buffer. Primals are recomputed in place.
    pub fn evaluate_forward_with(
        &mut self,
        from: PrimalPosition<M::Position>,
        to: PrimalPosition<M::Position>,
        adjoints: &mut AdjointVector<G>,
    ) -> Result<(), TapeError> {
        if self.active {
            return Err(TapeError::EvaluateWhileRecording);
        }
        if !(from >= to) {
            return Err(TapeError::PositionOrder);
        }
        let _span = trace_span!("evaluate_forward").entered();

        self.ensure_primals();
        adjoints.ensure(self.manager.max_live());
        let Self { statements, identifiers, constants, externals, primals, .. } = self;

        let mut statement_cursor = to.statements;
        let mut id_cursor = identifiers.forward_cursor(to.identifiers);
        let mut const_cursor = constants.forward_cursor(to.constants);
        let mut external_pos = to.externals;

        loop {
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
                identifiers,
                constants,
                primals,
                adjoints,
                statement_cursor,
                inner.statements,
                &mut id_cursor,
                &mut const_cursor,
            );
            statement_cursor = inner.statements;

            let entry = externals.get_mut(external_pos.chunk, external_pos.offset);
            let mut access = PrimalGradientAccess::new(adjoints, primals);
            entry.record.call_forward(&mut access)?;

            external_pos = LogPosition::new(external_pos.chunk, external_pos.offset + 1);
        }

        Self::sweep_forward(
            statements,
            identifiers,
            constants,
            primals,
            adjoints,
            statement_cursor,
            from.statements,
            &mut id_cursor,
            &mut const_cursor,
        );
        Ok(())
    }

    // PRIMAL REPLAY
    // --------------------------------------------------------------------------------------------

    /// Replays the primal computation between two positions, refreshing the
    /// primal vector. Combined with `set_primal` this re-evaluates the
    /// recorded function at new inputs without re-recording.
    pub fn evaluate_primal_between(
        &mut self,
        from: PrimalPosition<M::Position>,
        to: PrimalPosition<M::Position>,
    ) -> Result<(), TapeError> {
        if self.active {
            return Err(TapeError::EvaluateWhileRecording);
        }
        if !(from >= to) {
            return Err(TapeError::PositionOrder);
        }
        let _span = trace_span!("evaluate_primal").entered();

        self.ensure_primals();
        self.adjoints.ensure(self.manager.max_live());
        let Self { statements, identifiers, constants, externals, primals, adjoints, .. } = self;

        let mut statement_cursor = to.statements;
        let mut id_cursor = identifiers.forward_cursor(to.identifiers);
        let mut const_cursor = constants.forward_cursor(to.constants);
        let mut external_pos = to.externals;

        loop {
            if external_pos.offset >= externals.chunk_len(external_pos.chunk)
                && external_pos.chunk < from.externals.chunk
            {
                external_pos = LogPosition::new(external_pos.chunk + 1, 0);
            }
            if !(external_pos < from.externals) {
                break;
            }

            let inner = externals.get(external_pos.chunk, external_pos.offset).inner;
            Self::sweep_primal(
                statements,
                identifiers,
                constants,
                primals,
                statement_cursor,
                inner.statements,
                &mut id_cursor,
                &mut const_cursor,
            );
            statement_cursor = inner.statements;

            let entry = externals.get_mut(external_pos.chunk, external_pos.offset);
            let mut access = PrimalGradientAccess::new(adjoints, primals);
            entry.record.call_primal(&mut access)?;

            external_pos = LogPosition::new(external_pos.chunk, external_pos.offset + 1);
        }

        Self::sweep_primal(
            statements,
            identifiers,
            constants,
            primals,
            statement_cursor,
            from.statements,
            &mut id_cursor,
            &mut const_cursor,
        );
        Ok(())
    }

    /// Replays the primal computation of the whole tape.
    pub fn evaluate_primal(&mut self) -> Result<(), TapeError> {
        let (from, to) = (self.position(), self.zero_position());
        self.evaluate_primal_between(from, to)
    }
}

impl<R: Real, G: Gradient<R>, M: IndexManager> ReverseTape for PrimalValueTape<R, G, M> {
    type Real = R;
    type Gradient = G;
    type Position = PrimalPosition<M::Position>;

    const STORES_PRIMALS: bool = true;
    const ALLOW_JACOBIAN_OPTIMIZATION: bool = false;

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

        let active_count = rhs.active_count();
        if active_count == 0 {
            self.manager.free(lhs_id);
            *lhs_value = rhs.value();
            return;
        }

        debug_assert!(E::MAX_ACTIVE <= MAX_STATEMENT_ARGS);
        let promoted_bound = E::MAX_ACTIVE - active_count;
        self.statements.reserve(1).unwrap_or_else(|err| escalate_allocation(err));
        self.identifiers.reserve(E::MAX_ACTIVE).unwrap_or_else(|err| escalate_allocation(err));
        self.constants
            .reserve(E::MAX_CONSTANTS + promoted_bound)
            .unwrap_or_else(|err| escalate_allocation(err));

        let promoted = {
            let Self { identifiers, constants, .. } = self;
            let mut const_sink = ConstSink { constants: &mut *constants, count: 0 };
            rhs.push_constants(&mut const_sink);
            debug_assert_eq!(const_sink.count, E::MAX_CONSTANTS);

            let mut operand_sink = OperandSink {
                identifiers: &mut *identifiers,
                constants: &mut *constants,
                promoted: 0,
            };
            rhs.push_leaves(&mut operand_sink);
            operand_sink.promoted
        };
        debug_assert_eq!(promoted as usize, promoted_bound);

        self.manager.assign(lhs_id);
        self.ensure_primals();
        let old_primal = self.primals[*lhs_id as usize];
        self.statements.push(PrimalStatement {
            lhs: *lhs_id,
            old_primal,
            handle: handle_of::<E, G>(),
            promoted,
        });
        self.primals[*lhs_id as usize] = rhs.value();
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
            self.push_copy_statement(rhs_value, lhs_id, rhs_id);
        } else {
            self.manager.copy_assign(lhs_id, rhs_id);
        }
        *lhs_value = rhs_value;
    }

    fn store_passive(&mut self, lhs_value: &mut R, lhs_id: &mut Identifier, rhs: R) {
        if CHECK_TAPE_ACTIVITY && !self.active {
            self.manager.free(lhs_id);
            *lhs_value = rhs;
            return;
        }
        if M::IS_LINEAR {
            // under the linear manager the overwritten slot must stay
            // restorable across sweeps, so the passive value is recorded as
            // an input statement
            self.push_input_statement(rhs, lhs_id, false);
        } else {
            self.manager.free(lhs_id);
        }
        *lhs_value = rhs;
    }

    fn free_identifier(&mut self, id: &mut Identifier) {
        self.manager.free(id);
    }

    // REGISTRATION
    // --------------------------------------------------------------------------------------------

    fn register_input_id(&mut self, value: R, id: &mut Identifier) {
        self.push_input_statement(value, id, true);
    }

    fn register_output_id(&mut self, value: R, id: &mut Identifier) {
        if *id == PASSIVE_INDEX {
            return;
        }
        // only shared (use-counted) identifiers need a detaching copy; the
        // other managers record every copy as a statement anyway
        if !M::IS_LINEAR && !M::ASSIGN_NEEDS_STATEMENT {
            let rhs_id = *id;
            self.push_copy_statement(value, id, rhs_id);
        }
    }

    fn register_external_output_id(&mut self, value: R, id: &mut Identifier) -> R {
        self.push_input_statement(value, id, true)
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
        PrimalPosition {
            externals: self.externals.position(),
            statements: self.statements.position(),
            identifiers: self.identifiers.position(),
            constants: self.constants.position(),
            manager: self.manager.position(),
        }
    }

    fn zero_position(&self) -> Self::Position {
        PrimalPosition {
            externals: LogPosition::default(),
            statements: LogPosition::default(),
            identifiers: LogPosition::default(),
            constants: LogPosition::default(),
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
        self.identifiers.reset_to(pos.identifiers);
        self.constants.reset_to(pos.constants);
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
        let inner = PrimalInner {
            statements: self.statements.position(),
            identifiers: self.identifiers.position(),
            constants: self.constants.position(),
        };
        self.externals.push(ExternalEntry { record, inner });
        Ok(())
    }

    // INSPECTION
    // --------------------------------------------------------------------------------------------

    fn statistics(&self) -> TapeStatistics {
        TapeStatistics {
            tape_name: "PrimalValueTape",
            active: self.active,
            statements: LogStatistics::of(&self.statements),
            operand_data: LogStatistics::of(&self.identifiers),
            constants: Some(LogStatistics::of(&self.constants)),
            external_functions: self.externals.len(),
            adjoint_slots: self.adjoints.len(),
            adjoint_bytes: self.adjoints.allocated_bytes(),
            primal_slots: Some(self.primals.len()),
            max_live_identifier: self.manager.max_live(),
            free_identifiers: self.manager.free_count(),
        }
    }
}
