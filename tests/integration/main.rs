//! Integration tests exercising the engine through its public API with
//! scripted collaborators.

mod lifecycle;
mod mock_venue;
