mod disconnect;
mod enablement;
mod event_loop;
mod factory;
mod groups;
mod persistence;
mod resolution;
mod support;
