pub mod orchestrator;
pub mod run;
pub mod scoreboard;
