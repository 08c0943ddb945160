mod app;
mod pipeline;
