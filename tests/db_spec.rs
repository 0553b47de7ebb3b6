use backtrack::db::{Database, NotFound};
use backtrack::models::*;
use speculate2::speculate;
use uuid::Uuid;

fn create_test_project(db: &Database, name: &str) -> ProjectHierarchy {
    db.create_project(CreateProjectInput {
        name: name.to_string(),
        status: None,
    })
    .expect("Failed to create project")
}

fn pbi_input(name: &str, points: u32, priority: Priority, sprint: Option<Uuid>) -> CreatePbiInput {
    CreatePbiInput {
        name: name.to_string(),
        description: String::new(),
        point_estimate: PointEstimate::new(points).expect("valid point estimate"),
        sprint_backlog_id: sprint,
        status: None,
        priority: Some(priority),
    }
}

fn task_input(name: &str, estimated: f64, actual: Option<f64>) -> CreateTaskInput {
    CreateTaskInput {
        name: name.to_string(),
        description: String::new(),
        estimated_effort_hours: estimated.into(),
        actual_effort_hours: actual.map(EffortInput::from),
        status: None,
    }
}

fn validation_errors(err: anyhow::Error) -> ValidationErrors {
    err.downcast::<ValidationErrors>()
        .expect("Expected validation errors")
}

speculate! {
    before {
        let db = Database::open_memory().expect("Failed to create in-memory database");
        db.migrate().expect("Failed to run migrations");
    }

    describe "projects" {
        describe "create_project" {
            it "creates the project with its product backlog and first sprint" {
                let hierarchy = create_test_project(&db, "Apollo");

                assert_eq!(hierarchy.project.name, "Apollo");
                assert_eq!(hierarchy.project.status, ProjectStatus::Current);
                assert_eq!(hierarchy.product_backlog.name, "Apollo product backlog");
                assert_eq!(hierarchy.product_backlog.project_id, hierarchy.project.id);
                assert_eq!(hierarchy.sprint_backlog.name, "Apollo product backlog sprint0");
                assert_eq!(hierarchy.sprint_backlog.product_backlog_id, hierarchy.product_backlog.id);
                assert_eq!(hierarchy.sprint_backlog.status, SprintStatus::NotYetStarted);
            }

            it "persists exactly one backlog and one sprint" {
                let hierarchy = create_test_project(&db, "Apollo");

                let backlog = db.get_project_backlog(hierarchy.project.id)
                    .expect("Query failed")
                    .expect("Backlog missing");
                assert_eq!(backlog.id, hierarchy.product_backlog.id);

                let sprints = db.get_sprints_by_backlog(backlog.id).expect("Query failed");
                assert_eq!(sprints.len(), 1);
                assert_eq!(sprints[0].id, hierarchy.sprint_backlog.id);
            }

            it "accepts an explicit status" {
                let hierarchy = db.create_project(CreateProjectInput {
                    name: "Done".to_string(),
                    status: Some(ProjectStatus::Complete),
                }).expect("Failed to create project");

                assert_eq!(hierarchy.project.status, ProjectStatus::Complete);
            }

            it "rejects a blank name and creates nothing" {
                let err = db.create_project(CreateProjectInput {
                    name: "   ".to_string(),
                    status: None,
                }).unwrap_err();

                let errors = validation_errors(err);
                assert_eq!(errors.field("name"), Some(&["This field is required.".to_string()][..]));
                assert!(db.get_all_projects(None).expect("Query failed").is_empty());
            }

            it "rejects names over the length limit" {
                let err = db.create_project(CreateProjectInput {
                    name: "x".repeat(NAME_MAX_LEN + 1),
                    status: None,
                }).unwrap_err();

                assert!(validation_errors(err).field("name").is_some());
            }
        }

        describe "get_all_projects" {
            it "returns projects ordered by name" {
                create_test_project(&db, "Zebra");
                create_test_project(&db, "Alpha");

                let projects = db.get_all_projects(None).expect("Query failed");
                let names: Vec<&str> = projects.iter().map(|p| p.name.as_str()).collect();
                assert_eq!(names, vec!["Alpha", "Zebra"]);
            }

            it "filters by status" {
                create_test_project(&db, "Ongoing");
                db.create_project(CreateProjectInput {
                    name: "Shipped".to_string(),
                    status: Some(ProjectStatus::Complete),
                }).expect("Failed to create project");

                let complete = db.get_all_projects(Some(ProjectStatus::Complete)).expect("Query failed");
                assert_eq!(complete.len(), 1);
                assert_eq!(complete[0].name, "Shipped");
            }
        }

        describe "update_project" {
            it "returns None for a missing project" {
                let result = db.update_project(Uuid::new_v4(), UpdateProjectInput::default())
                    .expect("Query failed");
                assert!(result.is_none());
            }

            it "renames the project without creating another backlog or sprint" {
                let hierarchy = create_test_project(&db, "Before");

                let updated = db.update_project(hierarchy.project.id, UpdateProjectInput {
                    name: Some("After".to_string()),
                    status: Some(ProjectStatus::Complete),
                }).expect("Update failed").expect("Project missing");

                assert_eq!(updated.name, "After");
                assert_eq!(updated.status, ProjectStatus::Complete);

                let backlog = db.get_project_backlog(hierarchy.project.id)
                    .expect("Query failed")
                    .expect("Backlog missing");
                assert_eq!(backlog.id, hierarchy.product_backlog.id);
                assert_eq!(backlog.name, "Before product backlog");
                assert_eq!(db.get_sprints_by_backlog(backlog.id).expect("Query failed").len(), 1);
            }
        }

        describe "delete_project" {
            it "removes the whole hierarchy" {
                let hierarchy = create_test_project(&db, "Short lived");
                let pbi = db.create_pbi(
                    hierarchy.product_backlog.id,
                    pbi_input("Item", 3, Priority::Medium, Some(hierarchy.sprint_backlog.id)),
                ).expect("Failed to create PBI");
                let task = db.create_task(pbi.id, task_input("Work", 1.0, None))
                    .expect("Failed to create task");

                assert!(db.delete_project(hierarchy.project.id).expect("Delete failed"));

                assert!(db.get_project(hierarchy.project.id).expect("Query failed").is_none());
                assert!(db.get_product_backlog(hierarchy.product_backlog.id).expect("Query failed").is_none());
                assert!(db.get_sprint_backlog(hierarchy.sprint_backlog.id).expect("Query failed").is_none());
                assert!(db.get_pbi(pbi.id).expect("Query failed").is_none());
                assert!(db.get_task(task.id).expect("Query failed").is_none());
            }

            it "returns false for a missing project" {
                assert!(!db.delete_project(Uuid::new_v4()).expect("Delete failed"));
            }
        }

        describe "get_project_detail" {
            it "lists backlog PBIs by priority and sprints in creation order" {
                let hierarchy = create_test_project(&db, "Detail");
                let backlog_id = hierarchy.product_backlog.id;
                db.create_pbi(backlog_id, pbi_input("low", 1, Priority::Low, None)).expect("create");
                db.create_pbi(backlog_id, pbi_input("first high", 2, Priority::High, None)).expect("create");
                db.create_pbi(backlog_id, pbi_input("second high", 3, Priority::High, None)).expect("create");
                db.create_pbi(backlog_id, pbi_input("urgent", 5, Priority::VeryHigh, None)).expect("create");
                db.create_sprint_backlog(backlog_id, CreateSprintInput {
                    name: "Sprint 1".to_string(),
                    status: None,
                }).expect("Failed to create sprint");

                let detail = db.get_project_detail(hierarchy.project.id)
                    .expect("Query failed")
                    .expect("Project missing");

                let names: Vec<&str> = detail.pbis.iter().map(|p| p.name.as_str()).collect();
                assert_eq!(names, vec!["urgent", "first high", "second high", "low"]);

                let sprints: Vec<&str> = detail.sprints.iter().map(|s| s.sprint.name.as_str()).collect();
                assert_eq!(sprints, vec!["Detail product backlog sprint0", "Sprint 1"]);
            }
        }
    }

    describe "sprint_backlogs" {
        it "creates sprints in an existing backlog" {
            let hierarchy = create_test_project(&db, "Sprints");
            let sprint = db.create_sprint_backlog(hierarchy.product_backlog.id, CreateSprintInput {
                name: "Sprint 1".to_string(),
                status: Some(SprintStatus::Current),
            }).expect("Failed to create sprint");

            assert_eq!(sprint.product_backlog_id, hierarchy.product_backlog.id);
            assert_eq!(sprint.status, SprintStatus::Current);
            assert_eq!(
                db.get_sprint_project_id(sprint.id).expect("Query failed"),
                Some(hierarchy.project.id)
            );
        }

        it "fails with NotFound for a missing backlog" {
            let err = db.create_sprint_backlog(Uuid::new_v4(), CreateSprintInput {
                name: "Orphan".to_string(),
                status: None,
            }).unwrap_err();

            assert!(err.downcast_ref::<NotFound>().is_some());
        }

        it "updates name and status" {
            let hierarchy = create_test_project(&db, "Sprints");
            let updated = db.update_sprint_backlog(hierarchy.sprint_backlog.id, UpdateSprintInput {
                name: None,
                status: Some(SprintStatus::Complete),
            }).expect("Update failed").expect("Sprint missing");

            assert_eq!(updated.name, "Sprints product backlog sprint0");
            assert_eq!(updated.status, SprintStatus::Complete);
        }

        describe "aggregates" {
            it "sums points and effort over assigned PBIs" {
                let hierarchy = create_test_project(&db, "Sums");
                let backlog_id = hierarchy.product_backlog.id;
                let sprint_id = hierarchy.sprint_backlog.id;

                let p1 = db.create_pbi(backlog_id, pbi_input("P1", 5, Priority::Medium, Some(sprint_id)))
                    .expect("create");
                let p2 = db.create_pbi(backlog_id, pbi_input("P2", 8, Priority::Medium, Some(sprint_id)))
                    .expect("create");
                db.create_pbi(backlog_id, pbi_input("Unassigned", 40, Priority::Medium, None))
                    .expect("create");

                db.create_task(p1.id, task_input("T1", 2.0, Some(1.0))).expect("create");
                db.create_task(p1.id, task_input("T2", 3.0, Some(3.0))).expect("create");
                db.create_task(p2.id, task_input("T3", 4.0, None)).expect("create");

                let sprint = db.get_sprint_with_pbis(sprint_id)
                    .expect("Query failed")
                    .expect("Sprint missing");

                assert_eq!(sprint.total_story_points(), 13);
                assert_eq!(sprint.cumulative_effort_hours().hours(), 9.0);
                assert_eq!(sprint.actual_effort_hours().hours(), 4.0);
                assert_eq!(sprint.work_remaining(), 5.0);

                let p1 = db.get_pbi_with_tasks(p1.id).expect("Query failed").expect("PBI missing");
                assert_eq!(p1.cumulative_effort_hours().hours(), 5.0);
                assert_eq!(p1.actual_effort_hours().hours(), 4.0);
                assert_eq!(p1.work_remaining(), 1.0);
            }

            it "reports zero for an empty sprint" {
                let hierarchy = create_test_project(&db, "Empty");
                let sprint = db.get_sprint_with_pbis(hierarchy.sprint_backlog.id)
                    .expect("Query failed")
                    .expect("Sprint missing");

                assert_eq!(sprint.total_story_points(), 0);
                assert_eq!(sprint.cumulative_effort_hours(), EffortHours::ZERO);
                assert_eq!(sprint.work_remaining(), 0.0);
            }

            it "orders the sprint's PBIs by priority" {
                let hierarchy = create_test_project(&db, "Order");
                let backlog_id = hierarchy.product_backlog.id;
                let sprint_id = hierarchy.sprint_backlog.id;
                for (name, priority) in [
                    ("very low", Priority::VeryLow),
                    ("medium a", Priority::Medium),
                    ("very high", Priority::VeryHigh),
                    ("medium b", Priority::Medium),
                ] {
                    db.create_pbi(backlog_id, pbi_input(name, 1, priority, Some(sprint_id)))
                        .expect("create");
                }

                let sprint = db.get_sprint_with_pbis(sprint_id)
                    .expect("Query failed")
                    .expect("Sprint missing");
                let names: Vec<&str> = sprint.pbi_list().iter().map(|p| p.pbi.name.as_str()).collect();
                assert_eq!(names, vec!["very high", "medium a", "medium b", "very low"]);

                let stored: Vec<String> = db.get_pbis_by_sprint(sprint_id)
                    .expect("Query failed")
                    .into_iter()
                    .map(|p| p.name)
                    .collect();
                assert_eq!(stored, vec!["very high", "medium a", "medium b", "very low"]);
            }
        }
    }

    describe "pbis" {
        it "defaults status and priority" {
            let hierarchy = create_test_project(&db, "Defaults");
            let pbi = db.create_pbi(hierarchy.product_backlog.id, CreatePbiInput {
                name: "Plain".to_string(),
                description: "Just the basics".to_string(),
                point_estimate: PointEstimate::new(2).expect("valid"),
                sprint_backlog_id: None,
                status: None,
                priority: None,
            }).expect("Failed to create PBI");

            assert_eq!(pbi.status, PbiStatus::NotYetStarted);
            assert_eq!(pbi.priority, Priority::Medium);
            assert!(pbi.sprint_backlog_id.is_none());
        }

        it "rejects a sprint from another project's backlog" {
            let ours = create_test_project(&db, "Ours");
            let theirs = create_test_project(&db, "Theirs");

            let err = db.create_pbi(
                ours.product_backlog.id,
                pbi_input("Stray", 1, Priority::Medium, Some(theirs.sprint_backlog.id)),
            ).unwrap_err();

            assert!(validation_errors(err).field("sprint_backlog_id").is_some());
            assert!(db.get_backlog_pbis(ours.product_backlog.id).expect("Query failed").is_empty());
        }

        it "rejects descriptions over the length limit" {
            let hierarchy = create_test_project(&db, "Long");
            let mut input = pbi_input("Wordy", 1, Priority::Medium, None);
            input.description = "d".repeat(DESCRIPTION_MAX_LEN + 1);

            let err = db.create_pbi(hierarchy.product_backlog.id, input).unwrap_err();
            assert!(validation_errors(err).field("description").is_some());
        }

        it "moves between sprints and back to the backlog" {
            let hierarchy = create_test_project(&db, "Moves");
            let backlog_id = hierarchy.product_backlog.id;
            let second = db.create_sprint_backlog(backlog_id, CreateSprintInput {
                name: "Sprint 1".to_string(),
                status: None,
            }).expect("Failed to create sprint");
            let pbi = db.create_pbi(
                backlog_id,
                pbi_input("Mover", 3, Priority::High, Some(hierarchy.sprint_backlog.id)),
            ).expect("Failed to create PBI");

            let moved = db.update_pbi(pbi.id, UpdatePbiInput {
                sprint_backlog_id: Some(Some(second.id)),
                ..Default::default()
            }).expect("Update failed").expect("PBI missing");
            assert_eq!(moved.sprint_backlog_id, Some(second.id));

            let untouched = db.update_pbi(pbi.id, UpdatePbiInput {
                name: Some("Renamed".to_string()),
                ..Default::default()
            }).expect("Update failed").expect("PBI missing");
            assert_eq!(untouched.sprint_backlog_id, Some(second.id));

            let unassigned = db.update_pbi(pbi.id, UpdatePbiInput {
                sprint_backlog_id: Some(None),
                ..Default::default()
            }).expect("Update failed").expect("PBI missing");
            assert!(unassigned.sprint_backlog_id.is_none());
            assert!(db.get_pbis_by_sprint(second.id).expect("Query failed").is_empty());
        }

        it "deletes its tasks with it" {
            let hierarchy = create_test_project(&db, "Delete");
            let pbi = db.create_pbi(hierarchy.product_backlog.id, pbi_input("Gone", 1, Priority::Medium, None))
                .expect("Failed to create PBI");
            let task = db.create_task(pbi.id, task_input("Gone too", 1.0, None))
                .expect("Failed to create task");

            assert!(db.delete_pbi(pbi.id).expect("Delete failed"));
            assert!(db.get_task(task.id).expect("Query failed").is_none());
            assert!(!db.delete_pbi(pbi.id).expect("Delete failed"));
        }
    }

    describe "tasks" {
        it "parses effort given as text" {
            let hierarchy = create_test_project(&db, "Tasks");
            let pbi = db.create_pbi(hierarchy.product_backlog.id, pbi_input("Item", 1, Priority::Medium, None))
                .expect("Failed to create PBI");

            let task = db.create_task(pbi.id, CreateTaskInput {
                name: "Texty".to_string(),
                description: String::new(),
                estimated_effort_hours: "2.5".into(),
                actual_effort_hours: Some("".into()),
                status: Some(TaskStatus::InProgress),
            }).expect("Failed to create task");

            assert_eq!(task.estimated_effort_hours.map(EffortHours::hours), Some(2.5));
            assert!(task.actual_effort_hours.is_none());
            assert_eq!(task.status, TaskStatus::InProgress);
        }

        it "rejects non-numeric and negative effort" {
            let hierarchy = create_test_project(&db, "Tasks");
            let pbi = db.create_pbi(hierarchy.product_backlog.id, pbi_input("Item", 1, Priority::Medium, None))
                .expect("Failed to create PBI");

            let err = db.create_task(pbi.id, CreateTaskInput {
                name: "Bad".to_string(),
                description: String::new(),
                estimated_effort_hours: "a while".into(),
                actual_effort_hours: Some((-1.0).into()),
                status: None,
            }).unwrap_err();

            let errors = validation_errors(err);
            assert!(errors.field("estimated_effort_hours").is_some());
            assert!(errors.field("actual_effort_hours").is_some());
            assert!(db.get_tasks_by_pbi(pbi.id).expect("Query failed").is_empty());
        }

        it "fails with NotFound for a missing PBI" {
            let err = db.create_task(Uuid::new_v4(), task_input("Nowhere", 1.0, None)).unwrap_err();
            assert!(err.downcast_ref::<NotFound>().is_some());
        }

        it "logs actual effort and clears it again" {
            let hierarchy = create_test_project(&db, "Tasks");
            let pbi = db.create_pbi(hierarchy.product_backlog.id, pbi_input("Item", 1, Priority::Medium, None))
                .expect("Failed to create PBI");
            let task = db.create_task(pbi.id, task_input("Work", 3.0, None))
                .expect("Failed to create task");

            let logged = db.update_task(task.id, UpdateTaskInput {
                actual_effort_hours: Some(1.5.into()),
                status: Some(TaskStatus::Complete),
                ..Default::default()
            }).expect("Update failed").expect("Task missing");
            assert_eq!(logged.actual_effort_hours.map(EffortHours::hours), Some(1.5));
            assert_eq!(logged.estimated_effort_hours.map(EffortHours::hours), Some(3.0));

            let cleared = db.update_task(task.id, UpdateTaskInput {
                actual_effort_hours: Some("".into()),
                ..Default::default()
            }).expect("Update failed").expect("Task missing");
            assert!(cleared.actual_effort_hours.is_none());
            assert_eq!(cleared.status, TaskStatus::Complete);
        }

        it "groups tasks by status on the PBI" {
            let hierarchy = create_test_project(&db, "Groups");
            let pbi = db.create_pbi(hierarchy.product_backlog.id, pbi_input("Item", 1, Priority::Medium, None))
                .expect("Failed to create PBI");
            for (name, status) in [
                ("todo", TaskStatus::NotYetStarted),
                ("doing", TaskStatus::InProgress),
                ("done", TaskStatus::Complete),
                ("also done", TaskStatus::Complete),
            ] {
                let mut input = task_input(name, 1.0, None);
                input.status = Some(status);
                db.create_task(pbi.id, input).expect("Failed to create task");
            }

            let detail = db.get_pbi_with_tasks(pbi.id)
                .expect("Query failed")
                .expect("PBI missing")
                .detail();
            assert_eq!(detail.tasks_not_yet_started.len(), 1);
            assert_eq!(detail.tasks_in_progress.len(), 1);
            assert_eq!(detail.tasks_complete.len(), 2);
            assert_eq!(detail.cumulative_effort_hours.hours(), 4.0);
        }
    }

    describe "velocity_chart" {
        it "returns None for a missing project" {
            assert!(db.get_velocity_chart(Uuid::new_v4()).expect("Query failed").is_none());
        }

        it "is empty until a sprint completes" {
            let hierarchy = create_test_project(&db, "Velocity");
            let chart = db.get_velocity_chart(hierarchy.project.id)
                .expect("Query failed")
                .expect("Project missing");
            assert!(chart.is_empty());
        }

        it "includes only completed sprints in creation order" {
            let hierarchy = create_test_project(&db, "Velocity");
            let backlog_id = hierarchy.product_backlog.id;

            let mut sprint_ids = vec![hierarchy.sprint_backlog.id];
            for name in ["Sprint 1", "Sprint 2", "Sprint 3"] {
                let sprint = db.create_sprint_backlog(backlog_id, CreateSprintInput {
                    name: name.to_string(),
                    status: None,
                }).expect("Failed to create sprint");
                sprint_ids.push(sprint.id);
            }

            for (sprint_id, estimated, actual) in [
                (sprint_ids[0], 5.0, 4.0),
                (sprint_ids[1], 8.0, 9.0),
                (sprint_ids[3], 2.0, 2.0),
            ] {
                let pbi = db.create_pbi(backlog_id, pbi_input("Work", 3, Priority::Medium, Some(sprint_id)))
                    .expect("Failed to create PBI");
                db.create_task(pbi.id, task_input("Task", estimated, Some(actual)))
                    .expect("Failed to create task");
            }

            // Complete out of creation order; the chart follows creation order.
            for sprint_id in [sprint_ids[3], sprint_ids[0], sprint_ids[1]] {
                db.update_sprint_backlog(sprint_id, UpdateSprintInput {
                    name: None,
                    status: Some(SprintStatus::Complete),
                }).expect("Update failed");
            }

            let chart = db.get_velocity_chart(hierarchy.project.id)
                .expect("Query failed")
                .expect("Project missing");

            assert_eq!(chart.names, vec!["Velocity product backlog sprint0", "Sprint 1", "Sprint 3"]);
            assert_eq!(chart.estimated, vec![5.0, 8.0, 2.0]);
            assert_eq!(chart.actual, vec![4.0, 9.0, 2.0]);
            assert_eq!(chart.len(), 3);
        }

        it "ignores other projects' sprints" {
            let ours = create_test_project(&db, "Ours");
            let theirs = create_test_project(&db, "Theirs");
            db.update_sprint_backlog(theirs.sprint_backlog.id, UpdateSprintInput {
                name: None,
                status: Some(SprintStatus::Complete),
            }).expect("Update failed");

            let chart = db.get_velocity_chart(ours.project.id)
                .expect("Query failed")
                .expect("Project missing");
            assert!(chart.is_empty());
            assert_eq!(db.get_completed_sprints(theirs.project.id).expect("Query failed").len(), 1);
        }
    }

    describe "on_disk" {
        it "keeps data across reopen" {
            let dir = tempfile::tempdir().expect("Failed to create temp dir");
            let path = dir.path().join("backtrack.db");

            let project_id = {
                let disk = Database::open(path.clone()).expect("Failed to open database");
                disk.migrate().expect("Failed to migrate");
                create_test_project(&disk, "Persistent").project.id
            };

            let reopened = Database::open(path).expect("Failed to reopen database");
            reopened.migrate().expect("Migrations should be idempotent");
            let project = reopened.get_project(project_id)
                .expect("Query failed")
                .expect("Project missing");
            assert_eq!(project.name, "Persistent");
        }
    }
}
