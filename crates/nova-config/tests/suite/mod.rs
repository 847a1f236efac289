mod debugger;
mod discovery;
mod logging;
