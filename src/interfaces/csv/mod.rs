pub mod command_reader;
pub mod ledger_writer;

pub use command_reader::CommandReader;
pub use ledger_writer::LedgerWriter;
