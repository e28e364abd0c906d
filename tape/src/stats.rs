use core::fmt;

use descent_core::Identifier;

use crate::chunks::ChunkedLog;

// LOG STATISTICS
// ================================================================================================

/// Size figures of one chunked log.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LogStatistics {
    pub chunks: usize,
    pub entries: usize,
    pub used_bytes: usize,
    pub allocated_bytes: usize,
}

impl LogStatistics {
    pub(crate) fn of<T>(log: &ChunkedLog<T>) -> Self {
        Self {
            chunks: log.num_chunks(),
            entries: log.len(),
            used_bytes: log.used_bytes(),
            allocated_bytes: log.allocated_bytes(),
        }
    }
}

// TAPE STATISTICS
// ================================================================================================

/// Counts and byte sizes for each log of a tape and for its index manager.
#[derive(Clone, Debug)]
pub struct TapeStatistics {
    pub tape_name: &'static str,
    pub active: bool,
    /// Statement log figures.
    pub statements: LogStatistics,
    /// Jacobian entries (Jacobian tapes) or operand identifiers (primal-value
    /// tapes).
    pub operand_data: LogStatistics,
    /// Constant log figures; primal-value tapes only.
    pub constants: Option<LogStatistics>,
    pub external_functions: usize,
    pub adjoint_slots: usize,
    pub adjoint_bytes: usize,
    /// Primal vector size; primal-value tapes only.
    pub primal_slots: Option<usize>,
    pub max_live_identifier: Identifier,
    pub free_identifiers: usize,
}

impl TapeStatistics {
    /// Total bytes currently backing the tape.
    pub fn total_allocated_bytes(&self) -> usize {
        self.statements.allocated_bytes
            + self.operand_data.allocated_bytes
            + self.constants.map_or(0, |log| log.allocated_bytes)
            + self.adjoint_bytes
    }
}

impl fmt::Display for TapeStatistics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const MB: f64 = 1.0 / (1024.0 * 1024.0);
        let hline = "-------------------------------------";

        let section = |f: &mut fmt::Formatter<'_>, title: &str, log: &LogStatistics| {
            writeln!(f, "{hline}")?;
            writeln!(f, "{title}")?;
            writeln!(f, "{hline}")?;
            writeln!(f, "  Number of chunks: {:>10}", log.chunks)?;
            writeln!(f, "  Total number:     {:>10}", log.entries)?;
            writeln!(f, "  Memory used:      {:>10.2} MB", log.used_bytes as f64 * MB)?;
            writeln!(f, "  Memory allocated: {:>10.2} MB", log.allocated_bytes as f64 * MB)
        };

        writeln!(f, "{hline}")?;
        writeln!(f, "Tape statistics ({})", self.tape_name)?;
        writeln!(f, "{hline}")?;
        writeln!(f, "  Active:           {:>10}", self.active)?;
        writeln!(f, "  Max identifier:   {:>10}", self.max_live_identifier)?;
        writeln!(f, "  Free identifiers: {:>10}", self.free_identifiers)?;
        writeln!(f, "  External funcs:   {:>10}", self.external_functions)?;
        writeln!(f, "  Adjoint slots:    {:>10}", self.adjoint_slots)?;
        if let Some(primal_slots) = self.primal_slots {
            writeln!(f, "  Primal slots:     {:>10}", primal_slots)?;
        }

        section(f, "Statements", &self.statements)?;
        section(f, "Operand data", &self.operand_data)?;
        if let Some(constants) = &self.constants {
            section(f, "Constants", constants)?;
        }
        Ok(())
    }
}
