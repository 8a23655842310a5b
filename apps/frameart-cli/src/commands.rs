//! Subcommands and their execution against a device.

use std::path::PathBuf;

use anyhow::{Context, bail};
use clap::Subcommand;
use serde::Serialize;

use frameart_client::{
    ArtClient, ArtMode, FetchVerdict, SlideshowConfig, ThumbnailFetchPolicy, UploadOptions,
};

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Write a configuration file with the current settings
    InitConfig,

    /// Show power state and Frame TV support
    Status,

    /// Show or switch art mode
    ArtMode {
        /// `on` or `off`; omit to query
        mode: Option<String>,
    },

    /// Print art-mode changes until interrupted
    Watch,

    /// List stored artwork
    List {
        /// Category id, e.g. MY-C0002
        #[arg(short, long)]
        category: Option<String>,
    },

    /// Show the artwork currently displayed
    Current,

    /// Display a piece of artwork
    Select {
        content_id: String,
        #[arg(short, long)]
        category: Option<String>,
        /// Select without switching the display to it
        #[arg(long)]
        no_show: bool,
    },

    /// Download a thumbnail
    Thumbnail {
        content_id: String,
        /// Output file; `<content_id>.jpg` by default
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Upload an image file
    Upload {
        file: PathBuf,
        #[arg(long, default_value = "shadowbox_polar")]
        matte: String,
        #[arg(long, default_value = "shadowbox_polar")]
        portrait_matte: String,
    },

    /// Delete artwork
    Delete {
        #[arg(required = true)]
        content_ids: Vec<String>,
    },

    /// Mark or unmark a favourite
    Favourite {
        content_id: String,
        #[arg(long)]
        off: bool,
    },

    /// List available mattes
    Mattes,

    /// Change the matte of a piece of artwork
    SetMatte {
        content_id: String,
        matte: String,
        #[arg(long)]
        portrait: Option<String>,
    },

    /// List photo filters
    Filters,

    /// Apply a photo filter
    SetFilter { content_id: String, filter_id: String },

    /// Dump the art-mode settings
    Settings,

    /// Show or set the art-mode brightness
    Brightness { value: Option<i64> },

    /// Show or set the art-mode colour temperature
    ColorTemperature { value: Option<i64> },

    /// Show or configure the slideshow
    Slideshow {
        /// Minutes per image; 0 turns the slideshow off
        #[arg(long)]
        duration: Option<u32>,
        #[arg(long)]
        no_shuffle: bool,
        /// Category digit: 2 = my pictures, 4 = favourites, 8 = store
        #[arg(long, default_value_t = 2)]
        category: u8,
        /// Configure auto-rotation instead of the slideshow
        #[arg(long)]
        auto_rotation: bool,
    },

    /// Show the art app API version
    Version,
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn expect(ok: bool, what: &str) -> anyhow::Result<()> {
    if !ok {
        bail!("{what} failed");
    }
    println!("ok");
    Ok(())
}

/// Runs `command` against `client`. `InitConfig` is handled by the caller.
pub async fn run(client: &ArtClient, command: Command) -> anyhow::Result<()> {
    match command {
        Command::InitConfig => bail!("init-config does not talk to a device"),

        Command::Status => {
            let info = client
                .device_info()
                .await
                .context("device did not answer the status probe")?;
            print_json(&info)?;
            println!(
                "frame tv: {}, powered on: {}",
                info.supports_art_mode(),
                info.is_powered_on()
            );
        }

        Command::ArtMode { mode: None } => {
            let mode = client.get_artmode().await.context("art mode unavailable")?;
            println!("{mode}");
        }
        Command::ArtMode { mode: Some(mode) } => {
            let mode = match mode.as_str() {
                "on" => ArtMode::On,
                "off" => ArtMode::Off,
                other => bail!("art mode must be `on` or `off`, got {other:?}"),
            };
            expect(client.set_artmode(mode).await, "set_artmode")?;
        }

        Command::Watch => {
            client.open().await?;
            let mut updates = client.subscribe_art_mode();
            if let Some(mode) = client.get_artmode().await {
                println!("{mode}");
            }
            loop {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => break,
                    changed = updates.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        if let Some(mode) = *updates.borrow_and_update() {
                            println!("{mode}");
                        }
                    }
                }
            }
        }

        Command::List { category } => {
            print_json(&client.available(category.as_deref()).await)?;
        }

        Command::Current => {
            let current = client.get_current().await.context("no current artwork")?;
            print_json(&current)?;
        }

        Command::Select {
            content_id,
            category,
            no_show,
        } => {
            let ok = client
                .select_image(&content_id, category.as_deref(), !no_show)
                .await;
            expect(ok, "select_image")?;
        }

        Command::Thumbnail { content_id, out } => {
            let mut policy = ThumbnailFetchPolicy::new();
            let (verdict, bytes) = policy.fetch(client, &content_id).await;
            let Some(bytes) = bytes else {
                match verdict {
                    FetchVerdict::UsePlaceholder => {
                        bail!("no thumbnail for {content_id} (store artwork may be protected)")
                    }
                    _ => bail!("thumbnail for {content_id} could not be fetched"),
                }
            };
            let out = out.unwrap_or_else(|| PathBuf::from(format!("{content_id}.jpg")));
            tokio::fs::write(&out, &bytes)
                .await
                .with_context(|| format!("writing {}", out.display()))?;
            println!("{} ({} bytes)", out.display(), bytes.len());
        }

        Command::Upload {
            file,
            matte,
            portrait_matte,
        } => {
            let options = UploadOptions::default()
                .matte(Some(&matte))
                .portrait_matte(Some(&portrait_matte));
            let content_id = client
                .upload_file(&file, &options)
                .await
                .with_context(|| format!("upload of {} failed", file.display()))?;
            println!("{content_id}");
        }

        Command::Delete { content_ids } => {
            let ids: Vec<&str> = content_ids.iter().map(String::as_str).collect();
            expect(client.delete_list(&ids).await, "delete_image_list")?;
        }

        Command::Favourite { content_id, off } => {
            expect(client.set_favourite(&content_id, !off).await, "change_favorite")?;
        }

        Command::Mattes => print_json(&client.get_matte_list().await)?,

        Command::SetMatte {
            content_id,
            matte,
            portrait,
        } => {
            let ok = client
                .change_matte(&content_id, Some(&matte), portrait.as_deref())
                .await;
            expect(ok, "change_matte")?;
        }

        Command::Filters => print_json(&client.get_photo_filter_list().await)?,

        Command::SetFilter {
            content_id,
            filter_id,
        } => {
            expect(
                client.set_photo_filter(&content_id, &filter_id).await,
                "set_photo_filter",
            )?;
        }

        Command::Settings => print_json(&client.get_artmode_settings().await)?,

        Command::Brightness { value: None } => {
            print_json(&client.get_brightness().await.context("brightness unavailable")?)?;
        }
        Command::Brightness { value: Some(v) } => {
            expect(client.set_brightness(v).await, "set_brightness")?;
        }

        Command::ColorTemperature { value: None } => {
            let value = client
                .get_color_temperature()
                .await
                .context("colour temperature unavailable")?;
            print_json(&value)?;
        }
        Command::ColorTemperature { value: Some(v) } => {
            expect(client.set_color_temperature(v).await, "set_color_temperature")?;
        }

        Command::Slideshow {
            duration: None,
            auto_rotation,
            ..
        } => {
            let status = if auto_rotation {
                client.get_auto_rotation_status().await
            } else {
                client.get_slideshow_status().await
            };
            print_json(status.context("slideshow status unavailable")?.fields())?;
        }
        Command::Slideshow {
            duration: Some(duration),
            no_shuffle,
            category,
            auto_rotation,
        } => {
            let config = SlideshowConfig {
                duration,
                shuffle: !no_shuffle,
                category,
            };
            let ok = if auto_rotation {
                client.set_auto_rotation_status(&config).await
            } else {
                client.set_slideshow_status(&config).await
            };
            expect(ok, "slideshow")?;
        }

        Command::Version => {
            let version = client.get_api_version().await.context("no API version")?;
            println!("{version}");
        }
    }
    Ok(())
}
