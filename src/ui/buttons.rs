use serenity::{
    all::ButtonStyle,
    builder::{CreateActionRow, CreateButton},
};

/// IDs personalizados para los botones
pub mod button_ids {
    pub const QUEUE_PREVIOUS: &str = "queue_prev";
    pub const QUEUE_NEXT: &str = "queue_next";
}

/// Crea controles de paginación para la cola
pub fn create_pagination_controls(has_previous: bool, has_next: bool) -> CreateActionRow {
    let prev_btn = CreateButton::new(button_ids::QUEUE_PREVIOUS)
        .label("< Anterior")
        .style(ButtonStyle::Primary)
        .disabled(!has_previous);

    let next_btn = CreateButton::new(button_ids::QUEUE_NEXT)
        .label("Siguiente >")
        .style(ButtonStyle::Primary)
        .disabled(!has_next);

    CreateActionRow::Buttons(vec![prev_btn, next_btn])
}

/// Los mismos botones, todos desactivados (vista expirada)
pub fn create_expired_pagination_controls() -> CreateActionRow {
    create_pagination_controls(false, false)
}
