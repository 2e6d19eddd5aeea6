// HLS manifest resolution: turns a playlist URL into an ordered list of
// segment locators with their decryption references.

use std::collections::HashSet;

use bytes::Bytes;
use m3u8_rs::{KeyMethod, MediaPlaylist, Playlist, parse_playlist_res};
use tracing::debug;
use url::Url;

use crate::error::TransferError;
use crate::hls::decryption::{parse_iv, sequence_iv};
use crate::retry::{RetryPolicy, retry_with_backoff};
use crate::source::{ByteRange, ByteSource, parse_url};

/// Decryption reference of one segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentKey {
    pub uri: Url,
    pub iv: [u8; 16],
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    /// Position in the concatenated output.
    pub index: usize,
    pub url: Url,
    pub byte_range: Option<ByteRange>,
    pub key: Option<SegmentKey>,
    /// Media initialization section (`EXT-X-MAP`).
    pub is_init: bool,
}

/// Ordered segments of one media playlist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentPlan {
    pub playlist_url: Url,
    pub segments: Vec<Segment>,
}

impl SegmentPlan {
    /// Distinct key URIs in first-use order.
    pub fn key_uris(&self) -> Vec<&Url> {
        let mut uris: Vec<&Url> = Vec::new();
        for key in self.segments.iter().filter_map(|s| s.key.as_ref()) {
            if !uris.contains(&&key.uri) {
                uris.push(&key.uri);
            }
        }
        uris
    }
}

async fn fetch_playlist(
    source: &dyn ByteSource,
    url: &Url,
    retry: &RetryPolicy,
) -> Result<Bytes, TransferError> {
    retry_with_backoff(retry, "manifest", |_| source.fetch(url, None))
        .await
        .map_err(|e| TransferError::manifest(format!("failed to fetch {url}: {e}")))
}

fn parse(bytes: &[u8], url: &Url) -> Result<Playlist, TransferError> {
    parse_playlist_res(bytes)
        .map_err(|e| TransferError::manifest(format!("unparseable playlist {url}: {e:?}")))
}

/// Fetch and resolve `manifest_url`. A master playlist resolves through its
/// highest-bandwidth variant.
pub async fn resolve_manifest(
    source: &dyn ByteSource,
    manifest_url: &str,
    retry: &RetryPolicy,
) -> Result<SegmentPlan, TransferError> {
    let url = parse_url(manifest_url)?;
    let bytes = fetch_playlist(source, &url, retry).await?;

    match parse(&bytes, &url)? {
        Playlist::MediaPlaylist(media) => plan_from_media(&media, &bytes, &url),
        Playlist::MasterPlaylist(master) => {
            let variant = master
                .variants
                .iter()
                .filter(|v| !v.is_i_frame)
                .max_by_key(|v| v.bandwidth)
                .ok_or_else(|| TransferError::manifest("master playlist has no variants"))?;
            let variant_url = join(&url, &variant.uri)?;
            debug!(variant = %variant_url, bandwidth = variant.bandwidth, "selected variant");

            let bytes = fetch_playlist(source, &variant_url, retry).await?;
            match parse(&bytes, &variant_url)? {
                Playlist::MediaPlaylist(media) => plan_from_media(&media, &bytes, &variant_url),
                Playlist::MasterPlaylist(_) => Err(TransferError::manifest(
                    "variant playlist is itself a master playlist",
                )),
            }
        }
    }
}

fn join(base: &Url, uri: &str) -> Result<Url, TransferError> {
    base.join(uri)
        .map_err(|e| TransferError::invalid_url(uri, e.to_string()))
}

fn resolve_key(
    key: &m3u8_rs::Key,
    base: &Url,
    sequence: u64,
) -> Result<Option<SegmentKey>, TransferError> {
    match &key.method {
        KeyMethod::None => Ok(None),
        KeyMethod::AES128 => {
            let uri = key
                .uri
                .as_deref()
                .ok_or_else(|| TransferError::manifest("AES-128 key without URI"))?;
            let iv = match &key.iv {
                Some(hex) => parse_iv(hex).map_err(TransferError::manifest)?,
                None => sequence_iv(sequence),
            };
            Ok(Some(SegmentKey {
                uri: join(base, uri)?,
                iv,
            }))
        }
        other => Err(TransferError::UnsupportedEncryption {
            method: format!("{other:?}"),
        }),
    }
}

/// Positions of the segments right after an `EXT-X-KEY:METHOD=NONE`.
///
/// m3u8-rs reports such a tag as no key at all, which cannot be told apart
/// from a segment inheriting the previous key, so the raw text is scanned.
fn cleared_key_positions(raw: &[u8]) -> HashSet<usize> {
    let mut cleared = HashSet::new();
    let mut position = 0;
    let mut pending_none = false;
    for line in String::from_utf8_lossy(raw).lines().map(str::trim) {
        if let Some(attributes) = line.strip_prefix("#EXT-X-KEY:") {
            pending_none = attributes
                .split(',')
                .any(|attr| attr.trim().eq_ignore_ascii_case("METHOD=NONE"));
        } else if !line.is_empty() && !line.starts_with('#') {
            if pending_none {
                cleared.insert(position);
            }
            pending_none = false;
            position += 1;
        }
    }
    cleared
}

/// Flatten a media playlist into segments. `raw` is the playlist text
/// `playlist` was parsed from.
///
/// An `EXT-X-KEY` applies to every following segment until the next one;
/// byte ranges without an offset continue where the previous range ended.
pub fn plan_from_media(
    playlist: &MediaPlaylist,
    raw: &[u8],
    base: &Url,
) -> Result<SegmentPlan, TransferError> {
    let cleared = cleared_key_positions(raw);
    let mut segments = Vec::with_capacity(playlist.segments.len() + 1);
    let mut current_key: Option<&m3u8_rs::Key> = None;
    let mut current_map: Option<String> = None;
    let mut previous_range_end: Option<(String, u64)> = None;

    for (position, media) in playlist.segments.iter().enumerate() {
        let sequence = playlist.media_sequence + position as u64;
        if cleared.contains(&position) {
            current_key = None;
        } else if let Some(key) = &media.key {
            current_key = Some(key);
        }
        let key = match current_key {
            Some(k) => resolve_key(k, base, sequence)?,
            None => None,
        };

        if let Some(map) = &media.map
            && current_map.as_deref() != Some(map.uri.as_str())
        {
            current_map = Some(map.uri.clone());
            segments.push(Segment {
                index: segments.len(),
                url: join(base, &map.uri)?,
                byte_range: map.byte_range.as_ref().map(|r| ByteRange {
                    offset: r.offset.unwrap_or(0),
                    length: r.length,
                }),
                key: key.clone(),
                is_init: true,
            });
        }

        let byte_range = media.byte_range.as_ref().map(|r| {
            let offset = r.offset.unwrap_or_else(|| match &previous_range_end {
                Some((uri, end)) if *uri == media.uri => *end,
                _ => 0,
            });
            ByteRange {
                offset,
                length: r.length,
            }
        });
        previous_range_end = byte_range.map(|r| (media.uri.clone(), r.offset + r.length));

        segments.push(Segment {
            index: segments.len(),
            url: join(base, &media.uri)?,
            byte_range,
            key,
            is_init: false,
        });
    }

    Ok(SegmentPlan {
        playlist_url: base.clone(),
        segments,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MemorySource;

    const BASE: &str = "https://needledrop.example/hls/track/index.m3u8";

    fn plan(text: &str) -> Result<SegmentPlan, TransferError> {
        match parse_playlist_res(text.as_bytes()).unwrap() {
            Playlist::MediaPlaylist(pl) => {
                plan_from_media(&pl, text.as_bytes(), &Url::parse(BASE).unwrap())
            }
            Playlist::MasterPlaylist(_) => panic!("expected media playlist"),
        }
    }

    #[test]
    fn test_key_carries_forward_and_iv_derives_from_sequence() {
        let plan = plan(
            "#EXTM3U\n#EXT-X-VERSION:3\n#EXT-X-TARGETDURATION:10\n#EXT-X-MEDIA-SEQUENCE:5\n\
             #EXT-X-KEY:METHOD=AES-128,URI=\"key.bin\"\n\
             #EXTINF:10.0,\nseg0.ts\n#EXTINF:10.0,\nseg1.ts\n\
             #EXT-X-KEY:METHOD=NONE\n#EXTINF:10.0,\nseg2.ts\n#EXT-X-ENDLIST\n",
        )
        .unwrap();

        assert_eq!(plan.segments.len(), 3);
        let first = plan.segments[0].key.as_ref().unwrap();
        assert_eq!(first.uri.as_str(), "https://needledrop.example/hls/track/key.bin");
        assert_eq!(first.iv, sequence_iv(5));
        assert_eq!(plan.segments[1].key.as_ref().unwrap().iv, sequence_iv(6));
        assert!(plan.segments[2].key.is_none());
        assert_eq!(plan.key_uris().len(), 1);
        assert_eq!(
            plan.segments[2].url.as_str(),
            "https://needledrop.example/hls/track/seg2.ts"
        );
    }

    #[test]
    fn test_explicit_iv_and_byte_ranges() {
        let plan = plan(
            "#EXTM3U\n#EXT-X-VERSION:4\n#EXT-X-TARGETDURATION:10\n\
             #EXT-X-KEY:METHOD=AES-128,URI=\"https://keys.example/k\",IV=0x000102030405060708090a0b0c0d0e0f\n\
             #EXTINF:10.0,\n#EXT-X-BYTERANGE:100@0\nmedia.aac\n\
             #EXTINF:10.0,\n#EXT-X-BYTERANGE:50\nmedia.aac\n#EXT-X-ENDLIST\n",
        )
        .unwrap();
        let key = plan.segments[0].key.as_ref().unwrap();
        assert_eq!(key.iv, core::array::from_fn(|i| i as u8));
        assert_eq!(
            plan.segments[1].byte_range,
            Some(ByteRange {
                offset: 100,
                length: 50
            })
        );
    }

    #[test]
    fn test_sample_aes_is_rejected() {
        let result = plan(
            "#EXTM3U\n#EXT-X-TARGETDURATION:10\n\
             #EXT-X-KEY:METHOD=SAMPLE-AES,URI=\"k\"\n#EXTINF:10.0,\nseg0.ts\n#EXT-X-ENDLIST\n",
        );
        assert!(matches!(result, Err(TransferError::UnsupportedEncryption { .. })));
    }

    #[test]
    fn test_key_resumes_after_clear_segment() {
        let plan = plan(
            "#EXTM3U\n#EXT-X-TARGETDURATION:10\n\
             #EXT-X-KEY:METHOD=NONE\n#EXTINF:10.0,\nintro.ts\n\
             #EXT-X-KEY:METHOD=AES-128,URI=\"k1\"\n#EXTINF:10.0,\na.ts\n\
             #EXT-X-KEY:METHOD=NONE\n#EXTINF:10.0,\nad.ts\n#EXTINF:10.0,\nad2.ts\n\
             #EXT-X-KEY:METHOD=AES-128,URI=\"k2\"\n#EXTINF:10.0,\nb.ts\n#EXT-X-ENDLIST\n",
        )
        .unwrap();

        let keys: Vec<Option<&str>> = plan
            .segments
            .iter()
            .map(|s| s.key.as_ref().map(|k| k.uri.path()))
            .collect();
        assert_eq!(
            keys,
            [None, Some("/hls/track/k1"), None, None, Some("/hls/track/k2")]
        );
    }

    #[test]
    fn test_cleared_key_positions() {
        let raw = b"#EXTM3U\n#EXT-X-KEY:METHOD=AES-128,URI=\"k\"\n#EXTINF:4,\na.ts\n\
                    #EXT-X-KEY:METHOD=NONE\n#EXTINF:4,\nb.ts\n#EXTINF:4,\nc.ts\n";
        assert_eq!(cleared_key_positions(raw), HashSet::from([1]));
    }

    #[tokio::test]
    async fn test_master_playlist_resolves_highest_bandwidth() {
        let master = "#EXTM3U\n\
            #EXT-X-STREAM-INF:BANDWIDTH=64000\nlow/index.m3u8\n\
            #EXT-X-STREAM-INF:BANDWIDTH=128000\nhigh/index.m3u8\n";
        let high = "#EXTM3U\n#EXT-X-TARGETDURATION:10\n#EXTINF:10.0,\nseg0.ts\n#EXT-X-ENDLIST\n";
        let source = MemorySource::new()
            .with_body(BASE, master)
            .with_body("https://needledrop.example/hls/track/high/index.m3u8", high);

        let plan = resolve_manifest(&source, BASE, &RetryPolicy::none())
            .await
            .unwrap();
        assert_eq!(
            plan.segments[0].url.as_str(),
            "https://needledrop.example/hls/track/high/seg0.ts"
        );
    }

    #[tokio::test]
    async fn test_manifest_fetch_failure() {
        let source = MemorySource::new();
        let err = resolve_manifest(&source, BASE, &RetryPolicy::none())
            .await
            .unwrap_err();
        assert!(matches!(err, TransferError::Manifest { .. }));
    }
}
