mod event;
mod flow;
mod log;
mod schedule;
mod session;
mod version;
