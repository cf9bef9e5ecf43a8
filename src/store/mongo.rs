use async_trait::async_trait;
use futures::TryStreamExt;
use mongodb::{
    bson::{doc, oid::ObjectId, to_bson, Document},
    options::{FindOneOptions, FindOptions},
    Client, ClientSession, Collection, Database,
};

use super::{
    IncidentStore, FOLLOW_UP_COLLECTION, HOME_COLLECTION, INCIDENT_COLLECTION, PHOTO_COLLECTION,
    RESIDENT_COLLECTION,
};
use crate::{
    error::{IncidentError, IncidentResult},
    incident::access::IncidentScope,
    models::{
        home::Home,
        incident::{Incident, IncidentFollowUp, IncidentQuery, IncidentStatus},
        photo::{resequence, Photo, PhotoStatus},
        resident::Resident,
    },
};

/// `IncidentStore` over MongoDB. Multi-document operations need a replica set
/// because they run in transactions.
#[derive(Clone)]
pub struct MongoIncidentStore {
    client: Client,
    db: Database,
}

impl MongoIncidentStore {
    pub fn new(client: Client, db: Database) -> Self {
        MongoIncidentStore { client, db }
    }
    fn homes(&self) -> Collection<Home> {
        self.db.collection::<Home>(HOME_COLLECTION)
    }
    fn residents(&self) -> Collection<Resident> {
        self.db.collection::<Resident>(RESIDENT_COLLECTION)
    }
    fn incidents(&self) -> Collection<Incident> {
        self.db.collection::<Incident>(INCIDENT_COLLECTION)
    }
    fn follow_ups(&self) -> Collection<IncidentFollowUp> {
        self.db.collection::<IncidentFollowUp>(FOLLOW_UP_COLLECTION)
    }
    fn photos(&self) -> Collection<Photo> {
        self.db.collection::<Photo>(PHOTO_COLLECTION)
    }

    async fn photos_in_session(
        &self,
        incident_id: &ObjectId,
        session: &mut ClientSession,
    ) -> IncidentResult<Vec<Photo>> {
        let mut cursor = self
            .photos()
            .find_with_session(doc! { "incident_id": incident_id }, None, session)
            .await?;

        let mut photos: Vec<Photo> = Vec::new();
        while let Some(photo) = cursor.next(session).await {
            photos.push(photo?);
        }
        Ok(photos)
    }
}

fn incident_filter(query: &IncidentQuery, scope: &IncidentScope) -> IncidentResult<Document> {
    let mut clauses: Vec<Document> = Vec::new();

    if let Some(home_id) = query.home_id {
        clauses.push(doc! { "home_id": home_id });
    }
    if let Some(resident_id) = query.resident_id {
        clauses.push(doc! { "resident_id": resident_id });
    }
    if let Some(status) = &query.status {
        clauses.push(doc! { "status": to_bson(status)? });
    }
    if let Some(kind) = &query.kind {
        clauses.push(doc! { "kind": to_bson(kind)? });
    }
    if let Some(from) = query.occurred_from {
        clauses.push(doc! { "occurred_at": { "$gte": from } });
    }
    if let Some(to) = query.occurred_to {
        clauses.push(doc! { "occurred_at": { "$lt": to } });
    }

    clauses.push(doc! {
        "$or": [
            { "status": { "$ne": to_bson(&IncidentStatus::Draft)? } },
            { "reported_by_id": scope.viewer_id },
        ]
    });
    if let Some(home_ids) = &scope.home_ids {
        clauses.push(doc! { "home_id": { "$in": home_ids.clone() } });
    }

    Ok(doc! { "$and": clauses })
}

#[async_trait]
impl IncidentStore for MongoIncidentStore {
    async fn find_home(&self, home_id: &ObjectId) -> IncidentResult<Option<Home>> {
        Ok(self.homes().find_one(doc! { "_id": home_id }, None).await?)
    }

    async fn find_homes(&self) -> IncidentResult<Vec<Home>> {
        let cursor = self.homes().find(doc! {}, None).await?;
        Ok(cursor.try_collect().await?)
    }

    async fn find_resident(&self, resident_id: &ObjectId) -> IncidentResult<Option<Resident>> {
        Ok(self
            .residents()
            .find_one(doc! { "_id": resident_id }, None)
            .await?)
    }

    async fn count_incidents_by_home(&self, home_id: &ObjectId) -> IncidentResult<u64> {
        Ok(self
            .incidents()
            .count_documents(doc! { "home_id": home_id }, None)
            .await?)
    }

    async fn find_latest_reference_by_home(
        &self,
        home_id: &ObjectId,
    ) -> IncidentResult<Option<String>> {
        let options = FindOneOptions::builder()
            .sort(doc! { "created_at": -1, "_id": -1 })
            .build();
        let incident = self
            .incidents()
            .find_one(doc! { "home_id": home_id }, options)
            .await?;
        Ok(incident.map(|incident| incident.reference_number))
    }

    async fn insert_incident(&self, incident: &Incident) -> IncidentResult<()> {
        self.incidents().insert_one(incident, None).await?;
        Ok(())
    }

    async fn find_incident(&self, incident_id: &ObjectId) -> IncidentResult<Option<Incident>> {
        Ok(self
            .incidents()
            .find_one(doc! { "_id": incident_id }, None)
            .await?)
    }

    async fn find_incident_by_reference(
        &self,
        reference_number: &str,
    ) -> IncidentResult<Option<Incident>> {
        Ok(self
            .incidents()
            .find_one(doc! { "reference_number": reference_number }, None)
            .await?)
    }

    async fn find_incidents(
        &self,
        query: &IncidentQuery,
        scope: &IncidentScope,
    ) -> IncidentResult<(Vec<Incident>, u64)> {
        let filter = incident_filter(query, scope)?;
        let total = self
            .incidents()
            .count_documents(filter.clone(), None)
            .await?;

        let options = FindOptions::builder()
            .sort(doc! { "occurred_at": -1, "created_at": -1 })
            .skip(query.skip)
            .limit(query.limit as i64)
            .build();
        let cursor = self.incidents().find(filter, options).await?;
        let incidents: Vec<Incident> = cursor.try_collect().await?;

        Ok((incidents, total))
    }

    async fn update_incident(&self, incident: &Incident) -> IncidentResult<()> {
        let result = self
            .incidents()
            .update_one(
                doc! { "_id": incident._id },
                doc! { "$set": to_bson::<Incident>(incident)? },
                None,
            )
            .await?;

        if result.matched_count == 0 {
            return Err(IncidentError::NotFound("INCIDENT_NOT_FOUND".to_string()));
        }
        Ok(())
    }

    async fn delete_incident(&self, incident_id: &ObjectId) -> IncidentResult<Vec<Photo>> {
        let mut session = self.client.start_session(None).await?;
        session.start_transaction(None).await?;

        let photos = self.photos_in_session(incident_id, &mut session).await?;

        self.photos()
            .delete_many_with_session(doc! { "incident_id": incident_id }, None, &mut session)
            .await?;
        self.follow_ups()
            .delete_many_with_session(doc! { "incident_id": incident_id }, None, &mut session)
            .await?;
        let result = self
            .incidents()
            .delete_one_with_session(doc! { "_id": incident_id }, None, &mut session)
            .await?;

        if result.deleted_count == 0 {
            session.abort_transaction().await?;
            return Err(IncidentError::NotFound("INCIDENT_NOT_FOUND".to_string()));
        }

        session.commit_transaction().await?;
        Ok(photos)
    }

    async fn insert_follow_up(&self, follow_up: &IncidentFollowUp) -> IncidentResult<()> {
        self.follow_ups().insert_one(follow_up, None).await?;
        Ok(())
    }

    async fn find_follow_ups(&self, incident_id: &ObjectId) -> IncidentResult<Vec<IncidentFollowUp>> {
        let options = FindOptions::builder()
            .sort(doc! { "created_at": 1 })
            .build();
        let cursor = self
            .follow_ups()
            .find(doc! { "incident_id": incident_id }, options)
            .await?;
        Ok(cursor.try_collect().await?)
    }

    async fn count_photos(&self, incident_id: &ObjectId) -> IncidentResult<u64> {
        Ok(self
            .photos()
            .count_documents(doc! { "incident_id": incident_id }, None)
            .await?)
    }

    async fn insert_photo(&self, photo: &Photo) -> IncidentResult<()> {
        self.photos().insert_one(photo, None).await?;
        Ok(())
    }

    async fn find_photo(&self, photo_id: &ObjectId) -> IncidentResult<Option<Photo>> {
        Ok(self.photos().find_one(doc! { "_id": photo_id }, None).await?)
    }

    async fn find_photos(&self, incident_id: &ObjectId) -> IncidentResult<Vec<Photo>> {
        let options = FindOptions::builder()
            .sort(doc! { "display_order": 1, "created_at": 1 })
            .build();
        let cursor = self
            .photos()
            .find(doc! { "incident_id": incident_id }, options)
            .await?;
        Ok(cursor.try_collect().await?)
    }

    async fn confirm_photo(&self, photo_id: &ObjectId) -> IncidentResult<()> {
        let result = self
            .photos()
            .update_one(
                doc! { "_id": photo_id, "status": to_bson(&PhotoStatus::Pending)? },
                doc! { "$set": { "status": to_bson(&PhotoStatus::Confirmed)? } },
                None,
            )
            .await?;

        if result.matched_count == 0 {
            return Err(IncidentError::StateConflict(
                "PHOTO_NOT_PENDING".to_string(),
            ));
        }
        Ok(())
    }

    async fn delete_photo(&self, photo: &Photo) -> IncidentResult<()> {
        let mut session = self.client.start_session(None).await?;
        session.start_transaction(None).await?;

        let result = self
            .photos()
            .delete_one_with_session(doc! { "_id": photo._id }, None, &mut session)
            .await?;
        if result.deleted_count == 0 {
            session.abort_transaction().await?;
            return Err(IncidentError::NotFound("PHOTO_NOT_FOUND".to_string()));
        }

        let mut remaining = self
            .photos_in_session(&photo.incident_id, &mut session)
            .await?;
        for (photo_id, display_order) in resequence(&mut remaining) {
            self.photos()
                .update_one_with_session(
                    doc! { "_id": photo_id },
                    doc! { "$set": { "display_order": display_order } },
                    None,
                    &mut session,
                )
                .await?;
        }

        session.commit_transaction().await?;
        Ok(())
    }
}
