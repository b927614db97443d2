pub mod config;
pub mod console_display;
pub mod control_loop;
pub mod data_logger;
pub mod engine;
pub mod error;
pub mod jsonl_reader;
pub mod motion_sampler;
pub mod osc_engine;
pub mod session;
pub mod simulator;
pub mod smoother;
pub mod speed_mapper;
pub mod translator;
pub mod types;
