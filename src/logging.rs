use std::fmt::Display;
use colored::Colorize;
use crate::context;


#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Debug,
    #[default]
    Info,
    Warning,
    Error,
}


fn should_log(level: LogLevel) -> bool {
    let current = context::access(|ctx| {
        ctx.log_level
    });
    level >= current
}

pub fn debug<T: Display>(msg: T) {
    if should_log(LogLevel::Debug) {
        println!("[{}] {}", "DEBUG".red(), msg);
    }
}

pub fn info<T: Display>(msg: T) {
    if should_log(LogLevel::Info) {
        println!("[{}] {}", "*".blue(), msg);
    }
}

pub fn success<T: Display>(msg: T) {
    if should_log(LogLevel::Info) {
        println!("[{}] {}", "+".green(), msg);
    }
}

pub fn warn<T: Display>(msg: T) {
    if should_log(LogLevel::Warning) {
        println!("[{}] {}", "!".yellow(), msg);
    }
}

pub fn error<T: Display>(msg: T) {
    if should_log(LogLevel::Error) {
        println!("[{}] {}", "ERROR".white().on_red(), msg);
    }
}
