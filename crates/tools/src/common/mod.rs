//! コマンド共通のユーティリティ

pub mod config;
pub mod io;

pub use config::{init_logger, load_config, log_config, make_rng};
pub use io::{
    RecordReader, Writer, count_records, open_reader, open_writer, open_writer_with,
    read_all_records, write_all_records,
};
