use actix_web::{delete, get, post, put, web, HttpRequest, HttpResponse, ResponseError};
use mongodb::bson::oid::ObjectId;

use super::authenticated;
use crate::{
    incident::{lifecycle::IncidentLifecycleManager, reference},
    models::incident::{
        IncidentFollowUpRequest, IncidentQueryParams, IncidentRequest, IncidentStatusRequest,
        IncidentUpdateRequest, ReferenceValidationResponse,
    },
};

#[post("/incidents")]
pub async fn create_incident(
    manager: web::Data<IncidentLifecycleManager>,
    payload: web::Json<IncidentRequest>,
    req: HttpRequest,
) -> HttpResponse {
    let actor = match authenticated(&req) {
        Some(actor) => actor,
        None => return HttpResponse::Unauthorized().body("UNAUTHORIZED"),
    };

    match manager.create(&actor, payload.into_inner()).await {
        Ok(incident) => HttpResponse::Created().json(incident),
        Err(error) => error.error_response(),
    }
}
#[get("/incidents")]
pub async fn get_incidents(
    manager: web::Data<IncidentLifecycleManager>,
    query: web::Query<IncidentQueryParams>,
    req: HttpRequest,
) -> HttpResponse {
    let actor = match authenticated(&req) {
        Some(actor) => actor,
        None => return HttpResponse::Unauthorized().body("UNAUTHORIZED"),
    };

    match manager.list(&actor, query.into_inner()).await {
        Ok(page) => HttpResponse::Ok().json(page),
        Err(error) => error.error_response(),
    }
}
#[get("/incidents/{incident_id}")]
pub async fn get_incident(
    manager: web::Data<IncidentLifecycleManager>,
    incident_id: web::Path<String>,
    req: HttpRequest,
) -> HttpResponse {
    let actor = match authenticated(&req) {
        Some(actor) => actor,
        None => return HttpResponse::Unauthorized().body("UNAUTHORIZED"),
    };
    let incident_id: ObjectId = match incident_id.parse() {
        Ok(incident_id) => incident_id,
        Err(_) => return HttpResponse::BadRequest().body("INVALID_ID"),
    };

    match manager.get(&actor, &incident_id).await {
        Ok(incident) => HttpResponse::Ok().json(incident),
        Err(error) => error.error_response(),
    }
}
#[put("/incidents/{incident_id}")]
pub async fn update_incident(
    manager: web::Data<IncidentLifecycleManager>,
    incident_id: web::Path<String>,
    payload: web::Json<IncidentUpdateRequest>,
    req: HttpRequest,
) -> HttpResponse {
    let actor = match authenticated(&req) {
        Some(actor) => actor,
        None => return HttpResponse::Unauthorized().body("UNAUTHORIZED"),
    };
    let incident_id: ObjectId = match incident_id.parse() {
        Ok(incident_id) => incident_id,
        Err(_) => return HttpResponse::BadRequest().body("INVALID_ID"),
    };

    match manager
        .update_draft(&actor, &incident_id, payload.into_inner())
        .await
    {
        Ok(incident) => HttpResponse::Ok().json(incident),
        Err(error) => error.error_response(),
    }
}
#[delete("/incidents/{incident_id}")]
pub async fn delete_incident(
    manager: web::Data<IncidentLifecycleManager>,
    incident_id: web::Path<String>,
    req: HttpRequest,
) -> HttpResponse {
    let actor = match authenticated(&req) {
        Some(actor) => actor,
        None => return HttpResponse::Unauthorized().body("UNAUTHORIZED"),
    };
    let incident_id: ObjectId = match incident_id.parse() {
        Ok(incident_id) => incident_id,
        Err(_) => return HttpResponse::BadRequest().body("INVALID_ID"),
    };

    match manager.delete_draft(&actor, &incident_id).await {
        Ok(()) => HttpResponse::NoContent().finish(),
        Err(error) => error.error_response(),
    }
}
#[post("/incidents/{incident_id}/submit")]
pub async fn submit_incident(
    manager: web::Data<IncidentLifecycleManager>,
    incident_id: web::Path<String>,
    req: HttpRequest,
) -> HttpResponse {
    let actor = match authenticated(&req) {
        Some(actor) => actor,
        None => return HttpResponse::Unauthorized().body("UNAUTHORIZED"),
    };
    let incident_id: ObjectId = match incident_id.parse() {
        Ok(incident_id) => incident_id,
        Err(_) => return HttpResponse::BadRequest().body("INVALID_ID"),
    };

    match manager.submit(&actor, &incident_id).await {
        Ok(incident) => HttpResponse::Ok().json(incident),
        Err(error) => error.error_response(),
    }
}
#[put("/incidents/{incident_id}/status")]
pub async fn update_incident_status(
    manager: web::Data<IncidentLifecycleManager>,
    incident_id: web::Path<String>,
    payload: web::Json<IncidentStatusRequest>,
    req: HttpRequest,
) -> HttpResponse {
    let actor = match authenticated(&req) {
        Some(actor) => actor,
        None => return HttpResponse::Unauthorized().body("UNAUTHORIZED"),
    };
    let incident_id: ObjectId = match incident_id.parse() {
        Ok(incident_id) => incident_id,
        Err(_) => return HttpResponse::BadRequest().body("INVALID_ID"),
    };

    match manager
        .change_status(&actor, &incident_id, payload.into_inner())
        .await
    {
        Ok(incident) => HttpResponse::Ok().json(incident),
        Err(error) => error.error_response(),
    }
}
#[post("/incidents/{incident_id}/follow-ups")]
pub async fn create_incident_follow_up(
    manager: web::Data<IncidentLifecycleManager>,
    incident_id: web::Path<String>,
    payload: web::Json<IncidentFollowUpRequest>,
    req: HttpRequest,
) -> HttpResponse {
    let actor = match authenticated(&req) {
        Some(actor) => actor,
        None => return HttpResponse::Unauthorized().body("UNAUTHORIZED"),
    };
    let incident_id: ObjectId = match incident_id.parse() {
        Ok(incident_id) => incident_id,
        Err(_) => return HttpResponse::BadRequest().body("INVALID_ID"),
    };

    match manager
        .add_follow_up(&actor, &incident_id, payload.into_inner())
        .await
    {
        Ok(follow_up) => HttpResponse::Created().json(follow_up),
        Err(error) => error.error_response(),
    }
}
#[get("/incident-references/{reference_number}")]
pub async fn get_incident_by_reference(
    manager: web::Data<IncidentLifecycleManager>,
    reference_number: web::Path<String>,
    req: HttpRequest,
) -> HttpResponse {
    let actor = match authenticated(&req) {
        Some(actor) => actor,
        None => return HttpResponse::Unauthorized().body("UNAUTHORIZED"),
    };

    match manager.get_by_reference(&actor, &reference_number).await {
        Ok(incident) => HttpResponse::Ok().json(incident),
        Err(error) => error.error_response(),
    }
}
#[get("/incident-references/{reference_number}/validate")]
pub async fn validate_incident_reference(reference_number: web::Path<String>) -> HttpResponse {
    let reference_number: String = reference_number.into_inner();
    let valid = reference::validate(&reference_number);

    HttpResponse::Ok().json(ReferenceValidationResponse {
        reference_number,
        valid,
    })
}
