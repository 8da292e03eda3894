mod job_request;

pub use job_request::JobRequest;
