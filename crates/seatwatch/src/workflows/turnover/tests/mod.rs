mod common;
mod job;
