//! Presentación: vista paginada de la cola y builders de serenity.

pub mod buttons;
pub mod embeds;
pub mod paginator;
