mod relations;
mod state_cache;
mod timeline;
