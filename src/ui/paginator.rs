use crate::audio::{
    session::{PlaybackState, QueueSnapshot},
    track::{format_duration_secs, Platform, Requester},
};

/// Pistas por página en la vista de cola
pub const PAGE_SIZE: usize = 5;

/// Resultado de pulsar anterior/siguiente
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageTurn {
    /// La página cambió, hay que volver a dibujar
    Rerender,
    /// Ya estábamos en el borde
    Unchanged,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueEntry {
    /// Posición 1-based en la cola
    pub position: usize,
    pub title: String,
    pub url: Option<String>,
    pub platform: Platform,
    pub duration: String,
    /// Tiempo estimado hasta que empiece
    pub estimated: String,
}

/// Documento de una página, independiente de Discord
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuePage {
    pub title: String,
    pub description: String,
    pub entries: Vec<QueueEntry>,
    pub footer: String,
    pub footer_icon: Option<String>,
    pub has_previous: bool,
    pub has_next: bool,
}

/// Vista paginada de una cola.
///
/// Trabaja sobre una copia tomada al mostrar la cola, así que los cambios
/// posteriores no alteran una página ya enviada. La estimación de cada pista se
/// acumula desde el tiempo restante de la primera en el momento de la copia.
#[derive(Debug, Clone)]
pub struct QueuePaginator {
    snapshot: QueueSnapshot,
    remaining_at_snapshot: u64,
    page: usize,
}

impl QueuePaginator {
    pub fn new(snapshot: QueueSnapshot) -> Self {
        let remaining_at_snapshot = snapshot.remaining_time(snapshot.taken_at);
        Self {
            snapshot,
            remaining_at_snapshot,
            page: 0,
        }
    }

    pub fn page(&self) -> usize {
        self.page
    }

    pub fn total_pages(&self) -> usize {
        self.snapshot.tracks.len().div_ceil(PAGE_SIZE).max(1)
    }

    pub fn has_previous(&self) -> bool {
        self.page > 0
    }

    pub fn has_next(&self) -> bool {
        self.page + 1 < self.total_pages()
    }

    pub fn next(&mut self) -> PageTurn {
        if !self.has_next() {
            return PageTurn::Unchanged;
        }
        self.page += 1;
        PageTurn::Rerender
    }

    pub fn previous(&mut self) -> PageTurn {
        if !self.has_previous() {
            return PageTurn::Unchanged;
        }
        self.page -= 1;
        PageTurn::Rerender
    }

    pub fn render(&self, viewer: &Requester) -> QueuePage {
        let start = self.page * PAGE_SIZE;
        let tracks = &self.snapshot.tracks;

        // Total acumulado hasta el inicio de la página
        let mut cumulative = self.remaining_at_snapshot
            + tracks
                .iter()
                .take(start)
                .skip(1)
                .map(|t| t.duration_secs())
                .sum::<u64>();

        let mut entries = Vec::with_capacity(PAGE_SIZE);
        for (index, track) in tracks.iter().enumerate().skip(start).take(PAGE_SIZE) {
            let estimated = if index == 0 { 0 } else { cumulative };
            entries.push(QueueEntry {
                position: index + 1,
                title: track.title().to_string(),
                url: track.source_url().map(str::to_string),
                platform: track.platform(),
                duration: format_duration_secs(track.duration_secs()),
                estimated: format_duration_secs(estimated),
            });
            if index > 0 {
                cumulative += track.duration_secs();
            }
        }

        let mut description = format!("Página {}/{}", self.page + 1, self.total_pages());
        if self.snapshot.loop_current {
            description.push_str(" · 🔂 Repetición activada");
        }
        if self.snapshot.state == PlaybackState::Stalled {
            description.push_str(" · ⚠️ La canción actual no se pudo reproducir, usa /skip");
        }

        QueuePage {
            title: "🎶 Cola de Reproducción".to_string(),
            description,
            entries,
            footer: format!("Solicitado por {}", viewer.display_name),
            footer_icon: viewer.avatar_url.clone(),
            has_previous: self.has_previous(),
            has_next: self.has_next(),
        }
    }
}
