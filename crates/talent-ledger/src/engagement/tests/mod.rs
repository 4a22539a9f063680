mod common;
mod settlement;
