pub mod live;
pub mod web;
