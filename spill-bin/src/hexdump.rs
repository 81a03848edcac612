use spill_core::TargetAddr;
use std::io::Write;

/// Bytes per hex dump row.
pub const ROW_LEN: usize = 16;

/// Formats one hex dump row.
///
/// `bytes` holds at most [`ROW_LEN`] bytes. Missing bytes are padded so the
/// ASCII column of a partial row lines up with full rows.
pub fn format_row(addr: TargetAddr, bytes: &[u8]) -> String {
    let cells: Vec<String> = (0..ROW_LEN)
        .map(|i| match bytes.get(i) {
            Some(b) => format!("{:02x}", b),
            None => "  ".to_string(),
        })
        .collect();
    let ascii: String = bytes
        .iter()
        .map(|&b| {
            if b.is_ascii_graphic() || b == b' ' {
                b as char
            } else {
                '.'
            }
        })
        .collect();
    format!(
        "{:016x}  {}  {}  |{}|",
        addr,
        cells[..ROW_LEN / 2].join(" "),
        cells[ROW_LEN / 2..].join(" "),
        ascii
    )
}

/// Streams bytes to a writer as hex dump rows.
///
/// A row is written as soon as it is complete, so output keeps up with a slow
/// producer. Call [`finish`](HexDump::finish) to write a trailing partial row.
pub struct HexDump<W: Write> {
    out: W,
    row_addr: TargetAddr,
    row: Vec<u8>,
}

impl<W: Write> HexDump<W> {
    /// Creates a hex dump whose first byte lives at `start`.
    pub fn new(out: W, start: TargetAddr) -> Self {
        HexDump {
            out,
            row_addr: start,
            row: Vec::with_capacity(ROW_LEN),
        }
    }

    /// Appends one byte, writing the row once it is full.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if writing the row fails.
    pub fn push(&mut self, byte: u8) -> std::io::Result<()> {
        self.row.push(byte);
        if self.row.len() == ROW_LEN {
            self.flush_row()?;
        }
        Ok(())
    }

    /// Writes the remaining partial row and returns the writer.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if writing fails.
    pub fn finish(mut self) -> std::io::Result<W> {
        if !self.row.is_empty() {
            self.flush_row()?;
        }
        self.out.flush()?;
        Ok(self.out)
    }

    fn flush_row(&mut self) -> std::io::Result<()> {
        writeln!(self.out, "{}", format_row(self.row_addr, &self.row))?;
        self.out.flush()?;
        self.row_addr = self.row_addr + self.row.len();
        self.row.clear();
        Ok(())
    }
}
