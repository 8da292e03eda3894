use crate::errors::{self, JobError};
use uuid::Uuid;

pub type Image = String;
pub type Command = Vec<String>;
pub type JobId = Uuid;
pub type ContainerId = String;
pub type Artifact = bytes::Bytes;

/// What a job runs: an image reference and the argument vector handed to it.
///
/// Only constructible through [`JobSpec::new`], so a value of this type always
/// carries a non-empty image and a non-empty command.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct JobSpec {
    image: Image,
    command: Command,
}

impl JobSpec {
    pub fn new(image: Image, command: Command) -> errors::Result<Self> {
        if image.trim().is_empty() {
            return Err(JobError::Validation("image must not be empty".into()));
        }
        match command.first() {
            None => return Err(JobError::Validation("command must not be empty".into())),
            Some(program) if program.is_empty() => {
                return Err(JobError::Validation("command program must not be empty".into()))
            }
            Some(_) => {}
        }
        Ok(Self { image, command })
    }

    pub fn image(&self) -> &str {
        &self.image
    }

    pub fn command(&self) -> &[String] {
        &self.command
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_image_and_command() {
        let spec = JobSpec::new("alpine".into(), vec!["echo".into(), "hi".into()]).unwrap();
        assert_eq!(spec.image(), "alpine");
        assert_eq!(spec.command(), ["echo", "hi"]);
    }

    #[test]
    fn rejects_empty_parts() {
        assert!(matches!(
            JobSpec::new("".into(), vec!["echo".into()]),
            Err(JobError::Validation(_))
        ));
        assert!(matches!(
            JobSpec::new("  ".into(), vec!["echo".into()]),
            Err(JobError::Validation(_))
        ));
        assert!(matches!(
            JobSpec::new("alpine".into(), vec![]),
            Err(JobError::Validation(_))
        ));
        assert!(matches!(
            JobSpec::new("alpine".into(), vec!["".into(), "hi".into()]),
            Err(JobError::Validation(_))
        ));
    }
}
