use std::sync::Arc;

use crate::dao::{
    models::TrackListEntity,
    room_store::RoomStore,
    storage::{StorageResult, decode, encode},
};

const TRACKLIST_PREFIX: &str = "tracklists/";

/// Access to the candidate track lists rounds are built from.
#[derive(Clone)]
pub struct TrackListRepository {
    store: Arc<dyn RoomStore>,
}

impl TrackListRepository {
    pub fn new(store: Arc<dyn RoomStore>) -> Self {
        Self { store }
    }

    fn path(id: &str) -> String {
        format!("{TRACKLIST_PREFIX}{id}")
    }

    /// Create or replace a track list.
    pub async fn save(&self, list: &TrackListEntity) -> StorageResult<()> {
        let path = Self::path(&list.id);
        let value = encode(&path, list)?;
        self.store.set(path, Some(value)).await
    }

    pub async fn find(&self, id: &str) -> StorageResult<Option<TrackListEntity>> {
        let path = Self::path(id);
        match self.store.get(path.clone()).await? {
            Some(value) => decode(&path, value).map(Some),
            None => Ok(None),
        }
    }

    /// Every stored track list, ordered by id.
    pub async fn list(&self) -> StorageResult<Vec<TrackListEntity>> {
        self.store
            .list(TRACKLIST_PREFIX.to_string())
            .await?
            .into_iter()
            .map(|(path, value)| decode(&path, value))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{dao::room_store::memory::MemoryRoomStore, logic::round_builder::Track};

    fn list(id: &str, artists: &[&str]) -> TrackListEntity {
        TrackListEntity {
            id: id.into(),
            name: format!("List {id}"),
            tracks: artists
                .iter()
                .enumerate()
                .map(|(i, artist)| Track {
                    id: format!("{id}-{i}"),
                    uri: format!("spotify:track:{id}-{i}"),
                    name: format!("Song {i}"),
                    artist_names: vec![artist.to_string()],
                    duration_ms: 200_000,
                })
                .collect(),
        }
    }

    #[tokio::test]
    async fn saved_lists_are_listed_in_id_order() {
        let repo = TrackListRepository::new(Arc::new(MemoryRoomStore::new()));
        repo.save(&list("rock", &["Queen", "AC/DC"])).await.unwrap();
        repo.save(&list("pop", &["ABBA"])).await.unwrap();

        let ids: Vec<_> = repo
            .list()
            .await
            .unwrap()
            .into_iter()
            .map(|list| list.id)
            .collect();
        assert_eq!(ids, ["pop", "rock"]);
        assert_eq!(repo.find("rock").await.unwrap().unwrap().tracks.len(), 2);
        assert_eq!(repo.find("jazz").await.unwrap(), None);
    }

    #[tokio::test]
    async fn saving_again_replaces_the_list() {
        let repo = TrackListRepository::new(Arc::new(MemoryRoomStore::new()));
        repo.save(&list("rock", &["Queen", "AC/DC"])).await.unwrap();
        repo.save(&list("rock", &["Nirvana"])).await.unwrap();
        assert_eq!(repo.find("rock").await.unwrap().unwrap().tracks.len(), 1);
    }
}
