use std::sync::mpsc;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use indexmap::IndexMap;
use muse_contracts::campaign::{
    AspectRatio, CampaignId, GeneratedImage, ImageState, Platform, Post,
};

/// One campaign's posts, always in [`Platform::ALL`] order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Campaign {
    pub id: CampaignId,
    pub posts: IndexMap<Platform, Post>,
}

impl Campaign {
    pub fn new(id: CampaignId, posts: impl IntoIterator<Item = Post>) -> Self {
        let mut by_platform: IndexMap<Platform, Post> = posts
            .into_iter()
            .map(|post| (post.platform, post))
            .collect();
        by_platform.sort_by(|left, _, right, _| left.cmp(right));
        Self {
            id,
            posts: by_platform,
        }
    }

    pub fn post(&self, platform: Platform) -> Option<&Post> {
        self.posts.get(&platform)
    }

    pub fn posts(&self) -> impl Iterator<Item = &Post> {
        self.posts.values()
    }
}

/// Identifies one generation attempt of one post. Completions carrying a
/// key that no longer matches the session are dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AttemptKey {
    pub campaign_id: CampaignId,
    pub platform: Platform,
    pub attempt: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatchOutcome {
    Applied(Post),
    Stale,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionUpdate {
    CampaignReplaced { campaign_id: CampaignId },
    PostPatched { campaign_id: CampaignId, post: Post },
}

/// Caller edits applied when a single image is regenerated.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImageEdits {
    pub prompt: Option<String>,
    pub aspect_ratio: Option<AspectRatio>,
}

#[derive(Default)]
struct SessionState {
    current: Option<Campaign>,
    subscribers: Vec<mpsc::Sender<SessionUpdate>>,
}

impl SessionState {
    fn publish(&mut self, update: SessionUpdate) {
        self.subscribers
            .retain(|subscriber| subscriber.send(update.clone()).is_ok());
    }

    fn post_mut(&mut self, campaign_id: CampaignId, platform: Platform) -> Option<&mut Post> {
        self.current
            .as_mut()
            .filter(|campaign| campaign.id == campaign_id)
            .and_then(|campaign| campaign.posts.get_mut(&platform))
    }
}

/// The campaign currently on screen. Cheap to clone; all clones share state.
///
/// Every mutation is a read-modify-write under one mutex, so concurrent image
/// completions never interleave.
#[derive(Clone, Default)]
pub struct CampaignSession {
    state: Arc<Mutex<SessionState>>,
}

impl CampaignSession {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Installs `campaign` wholesale. In-flight completions for the previous
    /// campaign become stale.
    pub fn replace(&self, campaign: Campaign) {
        let mut state = self.lock();
        let campaign_id = campaign.id;
        state.current = Some(campaign);
        state.publish(SessionUpdate::CampaignReplaced { campaign_id });
    }

    pub fn snapshot(&self) -> Option<Campaign> {
        self.lock().current.clone()
    }

    pub fn current_id(&self) -> Option<CampaignId> {
        self.lock().current.as_ref().map(|campaign| campaign.id)
    }

    pub fn post(&self, platform: Platform) -> Option<Post> {
        self.lock()
            .current
            .as_ref()
            .and_then(|campaign| campaign.post(platform))
            .cloned()
    }

    pub fn subscribe(&self) -> mpsc::Receiver<SessionUpdate> {
        let (tx, rx) = mpsc::channel();
        self.lock().subscribers.push(tx);
        rx
    }

    /// Key for the attempt a post is currently waiting on, if it is pending.
    pub fn pending_key(&self, campaign_id: CampaignId, platform: Platform) -> Option<AttemptKey> {
        let mut state = self.lock();
        let post = state.post_mut(campaign_id, platform)?;
        post.is_pending().then_some(AttemptKey {
            campaign_id,
            platform,
            attempt: post.attempt,
        })
    }

    /// Starts a new attempt: applies `edits`, bumps the attempt counter and
    /// resets the post to pending. Returns the key and the updated post.
    pub fn begin_attempt(
        &self,
        campaign_id: CampaignId,
        platform: Platform,
        edits: &ImageEdits,
    ) -> Option<(AttemptKey, Post)> {
        let mut state = self.lock();
        let post = state.post_mut(campaign_id, platform)?;
        if let Some(prompt) = edits.prompt.as_ref() {
            post.image_prompt = prompt.clone();
        }
        if let Some(aspect_ratio) = edits.aspect_ratio {
            post.aspect_ratio = aspect_ratio;
        }
        post.attempt += 1;
        post.image_state = ImageState::Pending;
        post.image = None;
        let key = AttemptKey {
            campaign_id,
            platform,
            attempt: post.attempt,
        };
        let snapshot = post.clone();
        state.publish(SessionUpdate::PostPatched {
            campaign_id,
            post: snapshot.clone(),
        });
        Some((key, snapshot))
    }

    /// Resolves the attempt named by `key`. `Some(image)` marks the post
    /// ready, `None` marks it failed. Only the first completion of the
    /// current attempt of the current campaign is applied.
    pub fn complete(&self, key: AttemptKey, image: Option<GeneratedImage>) -> PatchOutcome {
        let mut state = self.lock();
        let Some(post) = state.post_mut(key.campaign_id, key.platform) else {
            return PatchOutcome::Stale;
        };
        if post.attempt != key.attempt || !post.is_pending() {
            return PatchOutcome::Stale;
        }
        match image {
            Some(image) => {
                post.image_state = ImageState::Ready;
                post.image = Some(image);
            }
            None => {
                post.image_state = ImageState::Failed;
                post.image = None;
            }
        }
        let patched = post.clone();
        state.publish(SessionUpdate::PostPatched {
            campaign_id: key.campaign_id,
            post: patched.clone(),
        });
        PatchOutcome::Applied(patched)
    }
}
