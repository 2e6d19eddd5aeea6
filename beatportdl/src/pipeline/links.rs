//! Link handlers: expand a store link into track pipelines.
//!
//! Handlers run without a global slot; only the per-track pipelines take one.
//! Every unit a handler spawns is also tracked by the batch, so the batch
//! barrier covers nested work.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use catalog::{Catalog, Chart, Link, LinkType, Release, Track};
use tracing::{debug, info};

use super::{Orchestrator, RunContext};
use crate::error::{PipelineError, Step, StepExt};
use crate::governor::Batch;

impl Orchestrator {
    /// Process one parsed link to completion.
    pub async fn handle_link(self: &Arc<Self>, link: Link, ctx: RunContext) {
        info!(url = %link.original, kind = %link.link_type, id = link.id, "Processing link");
        if let Err(e) = self.dispatch(&link, &ctx).await {
            ctx.fail(None, &e);
        }
    }

    async fn dispatch(self: &Arc<Self>, link: &Link, ctx: &RunContext) -> Result<(), PipelineError> {
        let catalog = self.catalog(link.store).at_step(Step::Resolve)?;
        let root = self.downloads_root();
        match link.link_type {
            LinkType::Track => self.track_link(catalog, link.id, &root, ctx).await,
            LinkType::Release => {
                self.release_link(catalog, link.id, root, false, ctx.clone())
                    .await
            }
            LinkType::Playlist => self.playlist_link(catalog, link.id, &root, ctx).await,
            LinkType::Chart => self.chart_link(catalog, link.id, &root, ctx).await,
            LinkType::Label => {
                self.label_link(catalog, link.id, link.params.as_deref(), &root, ctx)
                    .await
            }
            LinkType::Artist => {
                self.artist_link(catalog, link.id, link.params.as_deref(), &root, ctx)
                    .await
            }
        }
    }

    async fn track_link(
        &self,
        catalog: Arc<dyn Catalog>,
        id: u64,
        root: &Path,
        ctx: &RunContext,
    ) -> Result<(), PipelineError> {
        let track = catalog.track(id).await.at_step(Step::Resolve)?;
        let release = catalog
            .release(track.release.id)
            .await
            .at_step(Step::Resolve)?;
        let track = track.with_release(release);

        let dir = self.release_directory(root, &track.release, false);
        self.setup_directory(&dir).await?;
        self.track_in_release_dir(catalog.as_ref(), track, &dir, ctx)
            .await;
        self.cleanup(&dir).await;
        Ok(())
    }

    /// Cover, pipeline and cover policy for one track alone in its release directory.
    async fn track_in_release_dir(
        &self,
        catalog: &dyn Catalog,
        track: Track,
        dir: &Path,
        ctx: &RunContext,
    ) {
        let cover = self
            .fetch_cover(catalog, &track.release.image, dir, true, true)
            .await;
        let outcome = self
            .handle_track(
                catalog,
                &track,
                dir,
                cover.as_ref().map(|c| c.path()),
                ctx.chat_id,
            )
            .await;
        if ctx.record(&track, outcome) {
            drop(cover);
        } else {
            self.finish_cover(cover).await;
        }
    }

    async fn release_link(
        self: &Arc<Self>,
        catalog: Arc<dyn Catalog>,
        id: u64,
        parent: PathBuf,
        under_label: bool,
        ctx: RunContext,
    ) -> Result<(), PipelineError> {
        let release = catalog.release(id).await.at_step(Step::Resolve)?;
        let dir = self.release_directory(&parent, &release, under_label);
        self.setup_directory(&dir).await?;

        let result = self.release_tracks(catalog, release, &dir, &ctx).await;
        self.cleanup(&dir).await;
        result
    }

    async fn release_tracks(
        self: &Arc<Self>,
        catalog: Arc<dyn Catalog>,
        release: Release,
        dir: &Path,
        ctx: &RunContext,
    ) -> Result<(), PipelineError> {
        let tracks = catalog
            .release_tracks(release.id)
            .await
            .at_step(Step::Resolve)?;
        let cover = self
            .fetch_cover(catalog.as_ref(), &release.image, dir, true, true)
            .await;
        let cover_path: Option<Arc<Path>> = cover.as_ref().map(|c| Arc::from(c.path()));
        debug!(release_id = release.id, tracks = tracks.len(), "Release resolved");

        let placed = Arc::new(AtomicBool::new(false));
        let units = Batch::new();
        for listed in tracks {
            let this = self.clone();
            let catalog = catalog.clone();
            let release = release.clone();
            let dir = dir.to_path_buf();
            let cover = cover_path.clone();
            let placed = placed.clone();
            let ctx_unit = ctx.clone();
            ctx.batch.spawn_in(&units, async move {
                let track = match catalog.track(listed.id).await.at_step(Step::Resolve) {
                    Ok(track) => track.with_release(release),
                    Err(e) => return ctx_unit.fail(Some(listed.id), &e),
                };
                let outcome = this
                    .handle_track(catalog.as_ref(), &track, &dir, cover.as_deref(), ctx_unit.chat_id)
                    .await;
                if !ctx_unit.record(&track, outcome) {
                    placed.store(true, Ordering::Relaxed);
                }
            });
        }
        units.wait().await;
        // No sidecar for a release with nothing in it.
        if placed.load(Ordering::Relaxed) {
            self.finish_cover(cover).await;
        }
        Ok(())
    }

    async fn playlist_link(
        self: &Arc<Self>,
        catalog: Arc<dyn Catalog>,
        id: u64,
        root: &Path,
        ctx: &RunContext,
    ) -> Result<(), PipelineError> {
        let playlist = catalog.playlist(id).await.at_step(Step::Resolve)?;
        let dir = self.entity_directory(
            root,
            &playlist,
            &self.config.naming.playlist_directory_template,
        );
        self.setup_directory(&dir).await?;

        let result = match catalog.playlist_tracks(id).await.at_step(Step::Resolve) {
            Ok(items) => {
                let tracks = items.into_iter().map(|item| item.track).collect();
                self.collection_tracks(catalog, tracks, &dir, ctx).await;
                Ok(())
            }
            Err(e) => Err(e),
        };
        self.cleanup(&dir).await;
        result
    }

    async fn chart_link(
        self: &Arc<Self>,
        catalog: Arc<dyn Catalog>,
        id: u64,
        root: &Path,
        ctx: &RunContext,
    ) -> Result<(), PipelineError> {
        let chart = catalog.chart(id).await.at_step(Step::Resolve)?;
        let dir = self.entity_directory(root, &chart, &self.config.naming.chart_directory_template);
        self.setup_directory(&dir).await?;

        let result = self.chart_tracks(catalog, &chart, &dir, ctx).await;
        self.cleanup(&dir).await;
        result
    }

    async fn chart_tracks(
        self: &Arc<Self>,
        catalog: Arc<dyn Catalog>,
        chart: &Chart,
        dir: &Path,
        ctx: &RunContext,
    ) -> Result<(), PipelineError> {
        let tracks = catalog.chart_tracks(chart.id).await.at_step(Step::Resolve)?;
        // The chart artwork is only ever a sidecar.
        let cover = self
            .fetch_cover(catalog.as_ref(), &chart.image, dir, false, true)
            .await;
        self.collection_tracks(catalog, tracks, dir, ctx).await;
        self.finish_cover(cover).await;
        Ok(())
    }

    /// Tracks of a playlist or chart. Each gets its release backfilled and,
    /// with forced release directories, its own release directory and cover.
    async fn collection_tracks(
        self: &Arc<Self>,
        catalog: Arc<dyn Catalog>,
        tracks: Vec<Track>,
        dir: &Path,
        ctx: &RunContext,
    ) {
        let force_release = self.config.sorting.force_release_directories;
        let units = Batch::new();
        for listed in tracks {
            let this = self.clone();
            let catalog = catalog.clone();
            let dir = dir.to_path_buf();
            let ctx_unit = ctx.clone();
            ctx.batch.spawn_in(&units, async move {
                let track = match this.full_track(catalog.as_ref(), listed.id).await {
                    Ok(track) => track,
                    Err(e) => return ctx_unit.fail(Some(listed.id), &e),
                };
                if !force_release {
                    let cover = this
                        .fetch_cover(catalog.as_ref(), &track.release.image, &dir, true, false)
                        .await;
                    let outcome = this
                        .handle_track(
                            catalog.as_ref(),
                            &track,
                            &dir,
                            cover.as_ref().map(|c| c.path()),
                            ctx_unit.chat_id,
                        )
                        .await;
                    ctx_unit.record(&track, outcome);
                    // Shared directory: the per-track cover never stays.
                    drop(cover);
                    return;
                }

                let release_dir = this.release_directory(&dir, &track.release, false);
                if let Err(e) = this.setup_directory(&release_dir).await {
                    return ctx_unit.fail(Some(track.id), &e);
                }
                this.track_in_release_dir(catalog.as_ref(), track, &release_dir, &ctx_unit)
                    .await;
                this.cleanup(&release_dir).await;
            });
        }
        units.wait().await;
    }

    async fn label_link(
        self: &Arc<Self>,
        catalog: Arc<dyn Catalog>,
        id: u64,
        params: Option<&str>,
        root: &Path,
        ctx: &RunContext,
    ) -> Result<(), PipelineError> {
        let label = catalog.label(id).await.at_step(Step::Resolve)?;
        let dir = self.entity_directory(root, &label, &self.config.naming.label_directory_template);
        self.setup_directory(&dir).await?;

        let releases = match catalog.label_releases(id, params).await.at_step(Step::Resolve) {
            Ok(releases) => releases,
            Err(e) => {
                self.cleanup(&dir).await;
                return Err(e);
            }
        };
        debug!(label_id = id, releases = releases.len(), "Label resolved");

        let units = Batch::new();
        for release in releases {
            let this = self.clone();
            let catalog = catalog.clone();
            let dir = dir.clone();
            let ctx_unit = ctx.clone();
            ctx.batch.spawn_in(&units, async move {
                let nested = ctx_unit.clone();
                if let Err(e) = this
                    .release_link(catalog, release.id, dir, true, nested)
                    .await
                {
                    ctx_unit.fail(None, &e);
                }
            });
        }
        units.wait().await;
        self.cleanup(&dir).await;
        Ok(())
    }

    async fn artist_link(
        self: &Arc<Self>,
        catalog: Arc<dyn Catalog>,
        id: u64,
        params: Option<&str>,
        root: &Path,
        ctx: &RunContext,
    ) -> Result<(), PipelineError> {
        let artist = catalog.artist(id).await.at_step(Step::Resolve)?;
        let dir = self.entity_directory(root, &artist, &self.config.naming.artist_directory_template);
        self.setup_directory(&dir).await?;

        let tracks = match catalog.artist_tracks(id, params).await.at_step(Step::Resolve) {
            Ok(tracks) => tracks,
            Err(e) => {
                self.cleanup(&dir).await;
                return Err(e);
            }
        };

        let units = Batch::new();
        for listed in tracks {
            let this = self.clone();
            let catalog = catalog.clone();
            let dir = dir.clone();
            let ctx_unit = ctx.clone();
            ctx.batch.spawn_in(&units, async move {
                let track = match this.full_track(catalog.as_ref(), listed.id).await {
                    Ok(track) => track,
                    Err(e) => return ctx_unit.fail(Some(listed.id), &e),
                };
                let release_dir = this.release_directory(&dir, &track.release, false);
                if let Err(e) = this.setup_directory(&release_dir).await {
                    return ctx_unit.fail(Some(track.id), &e);
                }
                this.track_in_release_dir(catalog.as_ref(), track, &release_dir, &ctx_unit)
                    .await;
                this.cleanup(&release_dir).await;
            });
        }
        units.wait().await;
        self.cleanup(&dir).await;
        Ok(())
    }

    /// Full track (listings omit fields such as the number) with its release.
    async fn full_track(&self, catalog: &dyn Catalog, id: u64) -> Result<Track, PipelineError> {
        let track = catalog.track(id).await.at_step(Step::Resolve)?;
        let release = catalog
            .release(track.release.id)
            .await
            .at_step(Step::Resolve)?;
        Ok(track.with_release(release))
    }
}
