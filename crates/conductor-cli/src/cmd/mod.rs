pub mod cancel;
pub mod cap;
pub mod init;
pub mod plan;
pub mod run;
pub mod status;
pub mod workspace;
