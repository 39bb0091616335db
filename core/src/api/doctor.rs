//! Endpoints for a doctor acting on their own schedule, under `/api/doctor`.

use crate::client::ApiClient;
use crate::error::ApiError;
use crate::types::{
    ApiResponse, Appointment, AvailabilitySlot, CreateAvailabilityRequest,
    CreateScheduleBlockRequest, DateRangeParams, DoctorAppointmentsParams, MessageBody,
    ScheduleBlock, UpdateAppointmentStatusRequest, UpdateAvailabilityRequest,
    UpdateScheduleBlockRequest,
};

use super::params_of;

pub const AVAILABILITY_PATH: &str = "/api/doctor/availability";
pub const SCHEDULE_BLOCKS_PATH: &str = "/api/doctor/schedule-blocks";
pub const APPOINTMENTS_PATH: &str = "/api/doctor/appointments";

#[derive(Debug, Clone)]
pub struct DoctorAvailabilityApi {
    client: ApiClient,
}

impl DoctorAvailabilityApi {
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }

    pub async fn create_availability(
        &self,
        data: &CreateAvailabilityRequest,
    ) -> Result<ApiResponse<AvailabilitySlot>, ApiError> {
        self.client.post(AVAILABILITY_PATH, Some(data), None).await
    }

    pub async fn get_availability(&self) -> Result<ApiResponse<Vec<AvailabilitySlot>>, ApiError> {
        self.client.get(AVAILABILITY_PATH, None).await
    }

    pub async fn update_availability(
        &self,
        id: &str,
        data: &UpdateAvailabilityRequest,
    ) -> Result<ApiResponse<AvailabilitySlot>, ApiError> {
        self.client.put(&format!("{AVAILABILITY_PATH}/{id}"), Some(data), None).await
    }

    pub async fn delete_availability(
        &self,
        id: &str,
    ) -> Result<ApiResponse<MessageBody>, ApiError> {
        self.client.delete(&format!("{AVAILABILITY_PATH}/{id}"), None).await
    }
}

#[derive(Debug, Clone)]
pub struct DoctorScheduleBlocksApi {
    client: ApiClient,
}

impl DoctorScheduleBlocksApi {
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }

    pub async fn create_schedule_block(
        &self,
        data: &CreateScheduleBlockRequest,
    ) -> Result<ApiResponse<ScheduleBlock>, ApiError> {
        self.client.post(SCHEDULE_BLOCKS_PATH, Some(data), None).await
    }

    pub async fn get_schedule_blocks(
        &self,
        params: Option<&DateRangeParams>,
    ) -> Result<ApiResponse<Vec<ScheduleBlock>>, ApiError> {
        let params = params_of(params)?;
        self.client.get(SCHEDULE_BLOCKS_PATH, params.as_ref()).await
    }

    pub async fn update_schedule_block(
        &self,
        id: &str,
        data: &UpdateScheduleBlockRequest,
    ) -> Result<ApiResponse<ScheduleBlock>, ApiError> {
        self.client.put(&format!("{SCHEDULE_BLOCKS_PATH}/{id}"), Some(data), None).await
    }

    pub async fn delete_schedule_block(
        &self,
        id: &str,
    ) -> Result<ApiResponse<MessageBody>, ApiError> {
        self.client.delete(&format!("{SCHEDULE_BLOCKS_PATH}/{id}"), None).await
    }
}

#[derive(Debug, Clone)]
pub struct DoctorAppointmentsApi {
    client: ApiClient,
}

impl DoctorAppointmentsApi {
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }

    pub async fn get_appointments(
        &self,
        params: Option<&DoctorAppointmentsParams>,
    ) -> Result<ApiResponse<Vec<Appointment>>, ApiError> {
        let params = params_of(params)?;
        self.client.get(APPOINTMENTS_PATH, params.as_ref()).await
    }

    pub async fn get_appointment(&self, id: &str) -> Result<ApiResponse<Appointment>, ApiError> {
        self.client.get(&format!("{APPOINTMENTS_PATH}/{id}"), None).await
    }

    /// Ask the server to move an appointment to another status; the server
    /// decides whether the transition is allowed.
    pub async fn update_appointment_status(
        &self,
        id: &str,
        data: &UpdateAppointmentStatusRequest,
    ) -> Result<ApiResponse<Appointment>, ApiError> {
        self.client
            .put(&format!("{APPOINTMENTS_PATH}/{id}/status"), Some(data), None)
            .await
    }
}

#[derive(Debug, Clone)]
pub struct DoctorApi {
    pub availability: DoctorAvailabilityApi,
    pub schedule_blocks: DoctorScheduleBlocksApi,
    pub appointments: DoctorAppointmentsApi,
}

impl DoctorApi {
    pub fn new(client: ApiClient) -> Self {
        Self {
            availability: DoctorAvailabilityApi::new(client.clone()),
            schedule_blocks: DoctorScheduleBlocksApi::new(client.clone()),
            appointments: DoctorAppointmentsApi::new(client),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::http::{HttpBody, HttpMethod};
    use crate::test_support::StubTransport;
    use crate::types::AppointmentStatus;

    fn api(stub: &Arc<StubTransport>) -> DoctorApi {
        DoctorApi::new(ApiClient::with_transport("http://api.test", stub.clone()))
    }

    #[tokio::test]
    async fn schedule_blocks_without_params_has_bare_path() {
        let stub = Arc::new(StubTransport::new());
        stub.respond(200, r#"{"data":[],"success":true}"#);

        api(&stub).schedule_blocks.get_schedule_blocks(None).await.unwrap();

        assert_eq!(stub.last_request().url, "http://api.test/api/doctor/schedule-blocks");
    }

    #[tokio::test]
    async fn schedule_blocks_omit_missing_bounds() {
        let stub = Arc::new(StubTransport::new());
        stub.respond(200, r#"{"data":[],"success":true}"#);

        let params = DateRangeParams {
            start_date: Some("2025-08-01".to_string()),
            end_date: None,
        };
        api(&stub).schedule_blocks.get_schedule_blocks(Some(&params)).await.unwrap();

        assert_eq!(
            stub.last_request().url,
            "http://api.test/api/doctor/schedule-blocks?startDate=2025-08-01"
        );
    }

    #[tokio::test]
    async fn status_update_targets_status_subresource() {
        let stub = Arc::new(StubTransport::new());
        stub.respond(
            200,
            r#"{"data":{"id":"a1","doctorId":"1","patientId":"p","date":"2025-03-03","time":"10:00","status":"confirmed","createdAt":"c","updatedAt":"u"},"success":true}"#,
        );

        let req = UpdateAppointmentStatusRequest {
            status: AppointmentStatus::Confirmed,
            notes: None,
        };
        let res = api(&stub)
            .appointments
            .update_appointment_status("a1", &req)
            .await
            .unwrap();

        assert_eq!(res.data.status, AppointmentStatus::Confirmed);
        let sent = stub.last_request();
        assert_eq!(sent.method, HttpMethod::Put);
        assert_eq!(sent.url, "http://api.test/api/doctor/appointments/a1/status");
        assert_eq!(sent.body, Some(HttpBody::Json(r#"{"status":"confirmed"}"#.to_string())));
    }

    #[tokio::test]
    async fn delete_availability_targets_item() {
        let stub = Arc::new(StubTransport::new());
        stub.respond(200, r#"{"data":{"message":"deleted"},"success":true}"#);

        api(&stub).availability.delete_availability("s9").await.unwrap();

        let sent = stub.last_request();
        assert_eq!(sent.method, HttpMethod::Delete);
        assert_eq!(sent.url, "http://api.test/api/doctor/availability/s9");
    }
}
