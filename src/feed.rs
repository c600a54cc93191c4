use rss::{ChannelBuilder, Guid, ItemBuilder};

use crate::model::{DayDocument, MovieRecord, PLACEHOLDER_POSTER, UNKNOWN_DIRECTOR};

fn describe(movie: &MovieRecord) -> String {
    let mut parts = vec![movie.synopsis.clone()];

    if movie.director != UNKNOWN_DIRECTOR {
        parts.push(format!("Réalisation : {}", movie.director));
    }
    if let Some(minutes) = movie.runtime {
        parts.push(format!("Durée : {}h{:02}", minutes / 60, minutes % 60));
    }
    if !movie.genres.is_empty() {
        parts.push(format!("Genres : {}", movie.genres.join(", ")));
    }
    parts.push(format!("Note : {} ({})", movie.rating, movie.release_year));

    for (theater, showtimes) in &movie.seances {
        let times: Vec<String> = showtimes
            .iter()
            .map(|s| match &s.format {
                Some(format) => format!("{} {} {}", s.time.format("%H:%M"), s.lang.label(), format),
                None => format!("{} {}", s.time.format("%H:%M"), s.lang.label()),
            })
            .collect();
        parts.push(format!("{} : {}", theater, times.join(" · ")));
    }

    if movie.poster != PLACEHOLDER_POSTER {
        parts.push(format!("<img src=\"{}\" alt=\"Affiche\" />", movie.poster));
    }

    parts.join("<br/>\n")
}

/// RSS feed with one item per movie showing on `day`.
pub fn day_feed(
    day: &DayDocument,
    channel_title: &str,
    channel_link: &str,
) -> Result<String, Box<dyn std::error::Error>> {
    let items: Vec<_> = day
        .movies
        .iter()
        .map(|movie| {
            let link = movie.search_url.clone().unwrap_or_else(|| channel_link.to_string());
            let guid = Guid {
                value: format!("{}#{}", link, day.date),
                permalink: false,
            };

            let mut item_builder = ItemBuilder::default();
            item_builder.title(movie.title.clone());
            item_builder.link(link);
            item_builder.description(describe(movie));
            item_builder.guid(guid);
            item_builder.build()
        })
        .collect();

    let channel = ChannelBuilder::default()
        .title(channel_title)
        .link(channel_link)
        .description(format!("Séances du {}", day.date.format("%d/%m/%Y")))
        .items(items)
        .build();

    let mut buf = Vec::new();
    channel.write_to(&mut buf)?;
    Ok(String::from_utf8(buf)?)
}
