use mongodb::{
    bson::{doc, Document},
    Client, Database, IndexModel,
};
use tracing::info;

use crate::store::{FOLLOW_UP_COLLECTION, INCIDENT_COLLECTION, PHOTO_COLLECTION};

pub async fn connect(uri: &str, name: &str) -> mongodb::error::Result<(Client, Database)> {
    info!("connecting to MongoDB at {}", uri);

    let client = Client::with_uri_str(uri).await?;
    let db = client.database(name);

    db.run_command(doc! { "ping": 1 }, None).await?;
    ensure_indexes(&db).await?;

    info!("connected to MongoDB database '{}'", name);
    Ok((client, db))
}

async fn ensure_indexes(db: &Database) -> mongodb::error::Result<()> {
    let indexes: [(&str, Vec<Document>); 3] = [
        (
            INCIDENT_COLLECTION,
            vec![
                doc! { "home_id": 1, "occurred_at": -1 },
                doc! { "reference_number": 1 },
                doc! { "status": 1, "reported_by_id": 1 },
            ],
        ),
        (FOLLOW_UP_COLLECTION, vec![doc! { "incident_id": 1, "created_at": 1 }]),
        (PHOTO_COLLECTION, vec![doc! { "incident_id": 1, "display_order": 1 }]),
    ];

    for (collection, keys) in indexes {
        let models: Vec<IndexModel> = keys
            .into_iter()
            .map(|keys| IndexModel::builder().keys(keys).build())
            .collect();
        db.collection::<Document>(collection)
            .create_indexes(models, None)
            .await?;
    }
    Ok(())
}
